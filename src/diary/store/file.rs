use std::path::{Path, PathBuf};

use tracing::debug;

use super::{EntryRecord, EntryStore, StoreError, UserRecord, UserStore, is_valid_id};
use crate::diary::format;
use crate::diary::io::{self, DirLock, LockMode};

const USERS_DIR: &str = "users";
const ENTRIES_DIR: &str = "entries";
const USER_EXT: &str = "user";
const ENTRY_EXT: &str = "entry";

/// User records as `<root>/users/<user_id>.user`.
#[derive(Debug, Clone)]
pub struct FileUserStore {
    dir: PathBuf,
}

impl FileUserStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(USERS_DIR),
        }
    }

    fn path_for(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(user_id) {
            return Err(StoreError::InvalidIdentifier);
        }
        Ok(self.dir.join(format!("{user_id}.{USER_EXT}")))
    }
}

impl UserStore for FileUserStore {
    fn load_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let path = self.path_for(user_id)?;
        let _lock = DirLock::acquire(&self.dir, LockMode::Shared)?;

        match io::read_bytes(&path)? {
            Some(bytes) => Ok(Some(format::decode_user_record(&bytes)?)),
            None => Ok(None),
        }
    }

    fn insert_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.user_id)?;
        let _lock = DirLock::acquire(&self.dir, LockMode::Exclusive)?;

        if path.exists() {
            return Err(StoreError::AlreadyExists);
        }
        io::write_bytes_atomic(&path, &format::encode_user_record(record))?;
        debug!(path = %path.display(), "wrote user record");
        Ok(())
    }

    fn replace_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.user_id)?;
        let _lock = DirLock::acquire(&self.dir, LockMode::Exclusive)?;

        io::write_bytes_atomic(&path, &format::encode_user_record(record))?;
        debug!(path = %path.display(), "replaced user record");
        Ok(())
    }
}

/// Entry records as `<root>/entries/<user_id>/<entry_id>.entry`.
#[derive(Debug, Clone)]
pub struct FileEntryStore {
    dir: PathBuf,
}

impl FileEntryStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(ENTRIES_DIR),
        }
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(user_id) {
            return Err(StoreError::InvalidIdentifier);
        }
        Ok(self.dir.join(user_id))
    }

    fn entry_path(&self, user_dir: &Path, entry_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(entry_id) {
            return Err(StoreError::InvalidIdentifier);
        }
        Ok(user_dir.join(format!("{entry_id}.{ENTRY_EXT}")))
    }
}

impl EntryStore for FileEntryStore {
    fn get_entry(&self, user_id: &str, entry_id: &str) -> Result<Option<EntryRecord>, StoreError> {
        let user_dir = self.user_dir(user_id)?;
        let path = self.entry_path(&user_dir, entry_id)?;
        let _lock = DirLock::acquire(&user_dir, LockMode::Shared)?;

        match io::read_bytes(&path)? {
            Some(bytes) => Ok(Some(format::decode_entry_record(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_entry(&self, record: &EntryRecord) -> Result<(), StoreError> {
        let user_dir = self.user_dir(&record.user_id)?;
        let path = self.entry_path(&user_dir, &record.entry_id)?;
        let _lock = DirLock::acquire(&user_dir, LockMode::Exclusive)?;

        io::write_bytes_atomic(&path, &format::encode_entry_record(record))?;
        debug!(path = %path.display(), "wrote entry record");
        Ok(())
    }

    fn delete_entry(&self, user_id: &str, entry_id: &str) -> Result<bool, StoreError> {
        let user_dir = self.user_dir(user_id)?;
        let path = self.entry_path(&user_dir, entry_id)?;
        let _lock = DirLock::acquire(&user_dir, LockMode::Exclusive)?;

        Ok(io::remove_file(&path)?)
    }

    fn list_entry_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let user_dir = self.user_dir(user_id)?;
        if !user_dir.exists() {
            return Ok(Vec::new());
        }
        let _lock = DirLock::acquire(&user_dir, LockMode::Shared)?;

        Ok(io::list_stems(&user_dir, ENTRY_EXT)?)
    }
}
