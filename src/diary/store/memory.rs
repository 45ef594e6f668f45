use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EntryRecord, EntryStore, StoreError, UserRecord, UserStore};

/// In-process user records.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> MutexGuard<'_, HashMap<String, UserRecord>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserStore for MemoryUserStore {
    fn load_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users().get(user_id).cloned())
    }

    fn insert_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut users = self.users();
        if users.contains_key(&record.user_id) {
            return Err(StoreError::AlreadyExists);
        }
        users.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    fn replace_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.users().insert(record.user_id.clone(), record.clone());
        Ok(())
    }
}

/// In-process entry records keyed by `(user_id, entry_id)`.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: Mutex<BTreeMap<(String, String), EntryRecord>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<(String, String), EntryRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EntryStore for MemoryEntryStore {
    fn get_entry(&self, user_id: &str, entry_id: &str) -> Result<Option<EntryRecord>, StoreError> {
        Ok(self
            .entries()
            .get(&(user_id.to_string(), entry_id.to_string()))
            .cloned())
    }

    fn put_entry(&self, record: &EntryRecord) -> Result<(), StoreError> {
        self.entries().insert(
            (record.user_id.clone(), record.entry_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn delete_entry(&self, user_id: &str, entry_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries()
            .remove(&(user_id.to_string(), entry_id.to_string()))
            .is_some())
    }

    fn list_entry_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries()
            .keys()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, entry_id)| entry_id.clone())
            .collect())
    }
}
