//! The authenticated remote-backend client (Component C, §4.1).

pub mod backend;
pub mod retry;

pub use backend::{BackendClient, IndexEntry, IndexPage, SaveOutcome};
