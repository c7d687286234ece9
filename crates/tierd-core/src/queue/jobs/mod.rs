//! Job read and write operations on JobStore.

mod read;
mod write;
