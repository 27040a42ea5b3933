//! State store abstraction and the in-memory implementation
//!
//! The host exposes an ordered key–value store with point reads, point
//! writes and lexicographic range scans. The in-memory `BTreeMap`
//! implementation backs every test in the workspace; a production host
//! supplies its own store behind the same trait.

use crate::error::LedgerError;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered key–value store with prefix/range iteration.
///
/// Range bounds are lexicographic; `end` is exclusive. An empty `start`
/// scans from the first key, an empty `end` scans to the last.
pub trait StateStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

    fn range(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>, LedgerError>;
}

/// In-memory store over a `BTreeMap`
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn range(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>, LedgerError> {
        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start.to_string())
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end.to_string())
        };
        Ok(self
            .data
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.put("a", b"1".to_vec()).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_put_overwrites() {
        let mut store = MemoryStore::new();
        store.put("a", b"1".to_vec()).unwrap();
        store.put("a", b"2".to_vec()).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_range_is_lexicographic_and_end_exclusive() {
        let mut store = MemoryStore::new();
        store.put("trade-1", b"a".to_vec()).unwrap();
        store.put("trade-2", b"b".to_vec()).unwrap();
        store.put("tx-1", b"c".to_vec()).unwrap();

        let rows = store.range("trade-", "trade-~").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "trade-1");
        assert_eq!(rows[1].0, "trade-2");
    }

    #[test]
    fn test_empty_bounds_scan_everything() {
        let mut store = MemoryStore::new();
        store.put("a", b"1".to_vec()).unwrap();
        store.put("z", b"2".to_vec()).unwrap();
        let rows = store.range("", "").unwrap();
        assert_eq!(rows.len(), 2);
    }
}
