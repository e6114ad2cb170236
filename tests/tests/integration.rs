//! All integration tests for carta
#![expect(
    clippy::unwrap_used,
    reason = "integration test crate — unwraps are acceptable in test code"
)]

mod carta_filesource;
mod carta_store;
mod common;
