//! Dedup cache: the persisted set of slot keys that have already been notified.
//!
//! A key, once added, is never removed. Both backends implement [`SeenStore`]
//! so the orchestrator can run against the file store in production and the
//! in-memory store in tests.

mod error;
pub use error::StoreError;

mod file;
pub use file::JsonFileStore;

mod memory;
pub use memory::MemoryStore;

/// Repository of notified keys.
pub trait SeenStore {
    /// Whether `key` has been notified in this or any earlier run.
    fn has(&self, key: &str) -> bool;

    /// Record `key` and persist before returning.
    ///
    /// Returns `false` (and writes nothing) when the key was already present.
    fn add(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Number of keys held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
