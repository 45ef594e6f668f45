use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// In-process lock registry.
///
/// Entry operations hold their user's lock shared plus the entry's mutex; the
/// password-change sweep holds the user's lock exclusively. Different entries
/// never contend with each other.
#[derive(Debug, Default)]
pub struct LockTable {
    users: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    entries: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, user_id: &str) -> Arc<RwLock<()>> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    pub fn entry(&self, user_id: &str, entry_id: &str) -> Arc<Mutex<()>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((user_id.to_string(), entry_id.to_string()))
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_a_lock() {
        let table = LockTable::new();
        assert!(Arc::ptr_eq(&table.user("alice"), &table.user("alice")));
        assert!(!Arc::ptr_eq(&table.user("alice"), &table.user("bob")));
        assert!(Arc::ptr_eq(&table.entry("alice", "d1"), &table.entry("alice", "d1")));
        assert!(!Arc::ptr_eq(&table.entry("alice", "d1"), &table.entry("alice", "d2")));
    }

    #[test]
    fn exclusive_user_lock_excludes_readers() {
        let table = LockTable::new();
        let lock = table.user("alice");
        let _writer = lock.write().unwrap();
        assert!(table.user("alice").try_read().is_err());
        assert!(table.user("bob").try_read().is_ok());
    }
}
