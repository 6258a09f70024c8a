//! Record storage for the dedupe core.
//!
//! The traits define the abstract interface; [`InMemoryRecordStore`] is the
//! reference backend used by tests, embedded callers and the CLI.

mod memory;
mod traits;

pub use memory::InMemoryRecordStore;
pub use traits::{resolve_successor, RecordStore, RecordTxn, StorageError};
