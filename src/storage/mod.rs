use std::sync::Arc;

use parking_lot::Mutex;

mod list;
mod lru;

pub use lru::LruStore;

/// Behavior surface of the cache engine, consumed by command execution.
///
/// Keys and values are opaque byte strings compared bytewise. Absence and
/// size-bound rejection are ordinary outcomes, not errors.
pub trait Storage: Send {
    /// Inserts or updates a key, evicting least recently used entries to
    /// make room. Fails only when `key.len() + value.len()` exceeds the
    /// configured budget.
    fn put(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// As `put`, but refuses to replace an existing key.
    fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Updates an existing key only; returns false if the key is absent.
    fn set(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Returns a copy of the stored value and marks the entry as most
    /// recently used.
    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>>;

    /// Removes a key. Returns true if the key existed.
    fn delete(&mut self, key: &[u8]) -> bool;
}

/// Cache handle shared between worker threads. The lock is held for the
/// duration of a single engine operation and never across socket I/O.
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

pub fn shared(store: impl Storage + 'static) -> SharedStorage {
    Arc::new(Mutex::new(store))
}
