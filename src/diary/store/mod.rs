//! Durable storage seams.
//!
//! Stores persist records exactly as handed to them. They never see a
//! password, a key or plaintext: user records carry salt, verifier and KDF
//! parameters; entry records carry an envelope.

mod file;
mod memory;

pub use file::{FileEntryStore, FileUserStore};
pub use memory::{MemoryEntryStore, MemoryUserStore};

use crate::diary::crypto::{KdfParams, Salt, VerificationToken};
use crate::diary::envelope::Envelope;
use crate::diary::format::FormatError;
use crate::diary::io::IoError;
use thiserror::Error;

/// Longest accepted user or entry identifier.
pub const MAX_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub salt: Salt,
    pub token: VerificationToken,
    pub kdf_params: KdfParams,
    pub created_at: u64,
    /// Entry keys of unfinished password changes, each sealed under the key
    /// this record's password derives. Empty after a completed change.
    pub pending_keys: Vec<Envelope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub user_id: String,
    pub entry_id: String,
    pub envelope: Envelope,
    pub created_at: u64,
    pub modified_at: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error("malformed record: {0}")]
    Format(#[from] FormatError),

    #[error("record already exists")]
    AlreadyExists,

    #[error("invalid identifier")]
    InvalidIdentifier,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait UserStore: Send + Sync {
    fn load_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create a record; `StoreError::AlreadyExists` if the id is taken.
    fn insert_user(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Overwrite an existing record in one step.
    fn replace_user(&self, record: &UserRecord) -> Result<(), StoreError>;
}

pub trait EntryStore: Send + Sync {
    fn get_entry(&self, user_id: &str, entry_id: &str) -> Result<Option<EntryRecord>, StoreError>;

    /// Insert or overwrite.
    fn put_entry(&self, record: &EntryRecord) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    fn delete_entry(&self, user_id: &str, entry_id: &str) -> Result<bool, StoreError>;

    /// Entry ids of one user, sorted.
    fn list_entry_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Identifiers double as file names: 1..=128 chars of `[A-Za-z0-9._-]`, no
/// leading dot.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
