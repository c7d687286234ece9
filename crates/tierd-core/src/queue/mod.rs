//! Durable analysis job queue (SQLite via sqlx).
//!
//! State machine:
//! `pending → processing → completed`,
//! `processing → pending` on a halt (attempt count untouched),
//! `processing → pending | failed` on an error (attempt count + 1),
//! `pending → cancelled` on operator request.

pub mod db;
pub mod types;

mod jobs;

pub use db::{JobStore, DEFAULT_MAX_ATTEMPTS};
pub use types::*;

#[cfg(test)]
mod tests;
