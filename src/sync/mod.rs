//! Background sync engine and server-wins reconciliation (Component E, §4.3-§4.4).

pub mod engine;
pub mod reconcile;

pub use engine::{CycleOutcome, SyncEngine};
