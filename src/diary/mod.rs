//! Password-protected diary core.
//!
//! A password becomes an Argon2id master key; HKDF splits it into the entry
//! key a [`Session`] holds and the verification token a user record stores.
//! Entries are sealed with XChaCha20-Poly1305 under the entry key.

pub mod background;
pub mod crypto;
pub mod envelope;
pub mod format;
pub mod io;
pub mod store;

mod credentials;
mod document;
mod error;
mod locks;
mod ops;
mod session;
mod stats;

pub use background::{Pending, PendingError};
pub use credentials::{CredentialStore, PasswordChange};
pub use crypto::KdfParams;
pub use document::{EntryDocument, EntrySummary, Mood, SearchQuery, utc_day, word_count};
pub use error::{DiaryError, DiaryResult};
pub use ops::{Diary, DiaryOptions, EntryInfo};
pub use session::{Session, SessionStatus};
pub use stats::{ActiveDay, DiaryStats, LongestEntry};
