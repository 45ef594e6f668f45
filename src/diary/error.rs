//! Error taxonomy surfaced to callers of [`Diary`](crate::diary::Diary).
//!
//! Credential and cryptographic failures are never retried here; the caller
//! decides what to tell the user.

use thiserror::Error;

use crate::diary::crypto::CryptoError;
use crate::diary::store::StoreError;

#[derive(Debug, Error)]
pub enum DiaryError {
    #[error("user already exists")]
    DuplicateUser,

    #[error("user not found")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    /// Tampered or corrupt envelope for one entry. With a live session the key
    /// is already verified, so this never means "wrong password".
    #[error("entry '{0}' failed integrity check")]
    IntegrityFailure(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("entry '{0}' not found")]
    EntryNotFound(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("session expired")]
    SessionExpired,

    #[error("corrupt user record: {0}")]
    CorruptRecord(#[source] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<StoreError> for DiaryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Format(_) => DiaryError::CorruptRecord(err),
            StoreError::InvalidIdentifier => DiaryError::InvalidInput("malformed identifier"),
            other => DiaryError::StorageUnavailable(other),
        }
    }
}

pub type DiaryResult<T> = Result<T, DiaryError>;
