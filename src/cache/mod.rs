//! Embedded cache store: schema, models, and the single-writer handle
//! (Component D, §4.2, §3).

pub mod models;
pub mod schema;
pub mod store;
pub mod writer;

pub use models::Note;
pub use store::{owner_identity_hash, OpenOutcome};
pub use writer::CacheHandle;
