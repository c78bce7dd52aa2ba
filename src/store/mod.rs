//! In-memory string keyspace

mod table;

pub use table::{fnv1a, HashTable, INITIAL_BUCKETS};

use bytes::Bytes;

/// Owned key-value state of the server
///
/// Only the reactor thread touches it, so it is held by value and
/// borrowed mutably by the command executor.
#[derive(Default)]
pub struct Store {
    table: HashTable,
}

impl Store {
    pub fn new() -> Self {
        Self {
            table: HashTable::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.table.get(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.table.get(key).is_some()
    }

    /// Create or replace `key`
    pub fn set(&mut self, key: Bytes, value: Bytes) {
        self.table.insert(key, value);
    }

    /// Returns whether a key was removed
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.table.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.table.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let mut store = Store::new();
        store.set(Bytes::from_static(b"foo"), Bytes::from_static(b"bar"));
        assert_eq!(store.get(b"foo").map(|v| &v[..]), Some(&b"bar"[..]));
        assert!(store.contains_key(b"foo"));

        assert!(store.delete(b"foo"));
        assert!(!store.delete(b"foo"));
        assert!(store.get(b"foo").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn starts_with_initial_buckets() {
        let store = Store::new();
        assert_eq!(store.bucket_count(), INITIAL_BUCKETS);
        assert_eq!(store.len(), 0);
    }
}
