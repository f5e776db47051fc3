//! Library crate backing the `notecache-bridge` binary and its integration
//! tests. See `src/main.rs` for the process entry point.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod patch;
pub mod protocol;
pub mod schema;
pub mod sync;
pub mod tools;

/// Simperium bucket this bridge's notes live in (matches the upstream
/// Simplenote/Simperium wire protocol, §4.1).
pub const NOTES_BUCKET: &str = "note";
