//! Natural key -> dense id mapping
//!
//! The store addresses nodes by position, so every (label, natural key) pair
//! gets a compact id the first time it is seen. Ids start at 1, grow by one and
//! are never reassigned.

use std::collections::HashMap;

use crate::error::{ImportError, Result};

pub const FIRST_ID: u64 = 1;

/// Per-label key table. Nested maps let lookups borrow `&str` without
/// allocating a composite key.
#[derive(Debug)]
pub struct IdCache {
    labels: HashMap<String, HashMap<String, u64>>,
    next_id: u64,
    len: usize,
}

impl IdCache {
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
            next_id: FIRST_ID,
            len: 0,
        }
    }

    /// Get-or-create: returns the existing id or assigns the next one.
    pub fn put(&mut self, label: &str, key: &str) -> Result<u64> {
        if label.is_empty() || key.is_empty() {
            return Err(ImportError::InvalidArgument(format!(
                "empty label or node key ({:?}, {:?})",
                label, key
            )));
        }

        let keys = self.labels.entry(label.to_string()).or_default();
        if let Some(&id) = keys.get(key) {
            return Ok(id);
        }

        let id = self.next_id;
        keys.insert(key.to_string(), id);
        self.next_id += 1;
        self.len += 1;
        Ok(id)
    }

    /// Fails with the soft `NotFound` error if the pair was never put.
    pub fn get(&self, label: &str, key: &str) -> Result<u64> {
        match self.labels.get(label).and_then(|keys| keys.get(key)) {
            Some(&id) => Ok(id),
            None => {
                tracing::trace!("id cache miss: {}:{}", label, key);
                Err(ImportError::NotFound {
                    label: label.to_string(),
                    key: key.to_string(),
                })
            }
        }
    }

    pub fn contains(&self, label: &str, key: &str) -> bool {
        self.labels
            .get(label)
            .map(|keys| keys.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of cached keys for one label
    pub fn label_len(&self, label: &str) -> usize {
        self.labels.get(label).map(|keys| keys.len()).unwrap_or(0)
    }
}

impl Default for IdCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut cache = IdCache::new();
        assert_eq!(cache.put("Person", "1").unwrap(), 1);
        assert_eq!(cache.put("Person", "2").unwrap(), 2);
        assert_eq!(cache.put("City", "1").unwrap(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_put_is_get_or_create() {
        let mut cache = IdCache::new();
        let first = cache.put("Person", "alice").unwrap();
        cache.put("Person", "bob").unwrap();
        assert_eq!(cache.put("Person", "alice").unwrap(), first);
        // re-put must not burn an id
        assert_eq!(cache.put("Person", "carol").unwrap(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_distinct_pairs_get_distinct_ids() {
        let mut cache = IdCache::new();
        let pairs = [("A", "x"), ("B", "x"), ("A", "y"), ("A", "x"), ("B", "y"), ("B", "x")];
        let mut seen = std::collections::HashMap::new();
        let mut last = 0;
        for (label, key) in pairs {
            let id = cache.put(label, key).unwrap();
            match seen.get(&(label, key)) {
                Some(&prev) => assert_eq!(prev, id),
                None => {
                    assert!(id > last, "ids must increase in first-put order");
                    assert!(!seen.values().any(|&v| v == id));
                    last = id;
                    seen.insert((label, key), id);
                }
            }
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_get_before_put_is_soft_not_found() {
        let mut cache = IdCache::new();
        let err = cache.get("Person", "n2").unwrap_err();
        assert!(err.is_soft());

        let id = cache.put("Person", "n2").unwrap();
        assert_eq!(cache.get("Person", "n2").unwrap(), id);
        assert_eq!(cache.get("Person", "n2").unwrap(), id);
        assert!(cache.get("City", "n2").is_err());
    }

    #[test]
    fn test_empty_label_or_key_rejected() {
        let mut cache = IdCache::new();
        assert!(matches!(cache.put("", "1"), Err(ImportError::InvalidArgument(_))));
        assert!(matches!(cache.put("Person", ""), Err(ImportError::InvalidArgument(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_label_len() {
        let mut cache = IdCache::new();
        cache.put("Person", "1").unwrap();
        cache.put("Person", "2").unwrap();
        cache.put("City", "1").unwrap();
        assert_eq!(cache.label_len("Person"), 2);
        assert_eq!(cache.label_len("Nope"), 0);
        assert!(cache.contains("City", "1"));
    }
}
