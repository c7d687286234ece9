//! CLI command handlers, one per file.

mod cancel;
mod cleanup;
mod config;
mod enqueue;
mod serve;
mod status;

pub use cancel::run_cancel;
pub use cleanup::run_cleanup;
pub use config::run_config;
pub use enqueue::run_enqueue;
pub use serve::run_serve;
pub use status::run_status;
