use std::collections::HashSet;

use crate::{SeenStore, StoreError};

/// Non-persistent store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    keys: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl SeenStore for MemoryStore {
    fn has(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn add(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keys.insert(key.to_string()))
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_has() {
        let mut store = MemoryStore::new();
        assert!(!store.has("a|b|2025-01-05||"));
        assert!(store.add("a|b|2025-01-05||").unwrap());
        assert!(store.has("a|b|2025-01-05||"));
        assert!(!store.add("a|b|2025-01-05||").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn seeded_keys() {
        let store = MemoryStore::with_keys(["x", "y"]);
        assert!(store.has("x") && store.has("y"));
        assert_eq!(store.keys().count(), 2);
    }
}
