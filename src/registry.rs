/// Keyed concurrent registry
///
/// A string-keyed map behind a single mutex. Each operation takes the lock
/// once, does its lookup and mutation, and releases it; nothing is awaited
/// while the lock is held. The pending-request table and each event
/// subscription table own one registry apiece.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub struct Registry<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, V>> {
        // A panic inside a callback never runs under this lock, so a poisoned
        // map is still consistent.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert only if the key is free; hands the value back otherwise
    pub fn insert_unique(&self, key: &str, value: V) -> Result<(), V> {
        let mut entries = self.lock();
        if entries.contains_key(key) {
            return Err(value);
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Insert, replacing any previous value for the key
    pub fn insert(&self, key: &str, value: V) -> Option<V> {
        self.lock().insert(key.to_string(), value)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key)
    }

    /// Remove only if the current value matches `predicate`
    pub fn remove_if(&self, key: &str, predicate: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(value) if predicate(value) => entries.remove(key),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Registry<V> {
    /// Clone the value out so the caller can use it after the lock is released
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key).cloned()
    }
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_unique_rejects_second() {
        let registry = Registry::new();
        assert!(registry.insert_unique("read", 1).is_ok());
        assert_eq!(registry.insert_unique("read", 2), Err(2));
        assert_eq!(registry.get("read"), Some(1));
    }

    #[test]
    fn test_insert_overwrites() {
        let registry = Registry::new();
        assert_eq!(registry.insert("158d0001", "first"), None);
        assert_eq!(registry.insert("158d0001", "second"), Some("first"));
        assert_eq!(registry.get("158d0001"), Some("second"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_once() {
        let registry = Registry::new();
        registry.insert("read", 7);
        assert_eq!(registry.remove("read"), Some(7));
        assert_eq!(registry.remove("read"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_if_checks_value() {
        let registry = Registry::new();
        registry.insert("read", 1u64);
        assert_eq!(registry.remove_if("read", |v| *v == 2), None);
        assert!(registry.contains("read"));
        assert_eq!(registry.remove_if("read", |v| *v == 1), Some(1));
    }

    #[test]
    fn test_concurrent_unique_insert() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.insert_unique("get_id_list", i).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
