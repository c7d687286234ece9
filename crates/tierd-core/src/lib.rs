pub mod config;
pub mod logging;

pub mod activity;
pub mod ingress;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod work;
