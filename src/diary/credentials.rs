//! Credential store: registration, login verification, password rotation.
//!
//! Only `{user_id, salt, kdf_params, verification token}` is persisted. A login
//! re-derives the master key, expands the token and compares it in constant
//! time. Unknown users pay the same Argon2 cost against a fixed dummy salt so
//! that response time does not reveal which user ids exist.
//!
//! A password change is staged before any entry is rewritten: the new entry
//! key is sealed under the current one and appended to the record. Until the
//! new record is committed, the current password therefore opens envelopes
//! under either key.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::diary::crypto::{self, EntryKey, KdfParams, MasterKey, Salt, VerificationToken};
use crate::diary::envelope;
use crate::diary::error::{DiaryError, DiaryResult};
use crate::diary::store::{StoreError, UserRecord, UserStore, is_valid_id};

const DUMMY_SALT: Salt = *b"quietquill-dummy";

/// A verified password change, ready to commit once entries are migrated.
#[derive(Debug)]
pub struct PasswordChange {
    pub old_key: MasterKey,
    pub new_key: MasterKey,
    pub old_record: UserRecord,
    pub new_record: UserRecord,
}

pub struct CredentialStore {
    users: Arc<dyn UserStore>,
    params: KdfParams,
    dummy_token: VerificationToken,
}

impl CredentialStore {
    /// `params` applies to new registrations and password changes; existing
    /// users keep the parameters stored in their record.
    pub fn new(users: Arc<dyn UserStore>, params: KdfParams) -> Self {
        Self {
            users,
            params,
            dummy_token: VerificationToken::from_bytes(crypto::random_bytes()),
        }
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.params
    }

    pub fn register(&self, user_id: &str, password: &SecretString) -> DiaryResult<()> {
        validate_user_id(user_id)?;
        validate_password(password)?;

        if self.users.load_user(user_id)?.is_some() {
            return Err(DiaryError::DuplicateUser);
        }

        let record = self.new_record(user_id, password, now_unix())?.0;
        match self.users.insert_user(&record) {
            Ok(()) => {
                info!(user = %user_id, "registered user");
                Ok(())
            }
            Err(StoreError::AlreadyExists) => Err(DiaryError::DuplicateUser),
            Err(err) => Err(err.into()),
        }
    }

    /// Check a password and return the master key on success.
    pub fn verify(&self, user_id: &str, password: &SecretString) -> DiaryResult<MasterKey> {
        self.check(user_id, password).map(|(key, _)| key)
    }

    /// Verify a login and open the keys it unlocks: the entry key, then any
    /// keys staged by unfinished password changes.
    pub(crate) fn unlock(
        &self,
        user_id: &str,
        password: &SecretString,
    ) -> DiaryResult<(EntryKey, Vec<EntryKey>)> {
        let (master, record) = self.check(user_id, password)?;
        let entry_key = master.entry_key()?;
        let pending = pending_keys(&entry_key, &record);
        Ok((entry_key, pending))
    }

    /// Verify `old_password` and derive everything the new password needs.
    /// Nothing is persisted until [`CredentialStore::stage`].
    pub fn begin_change(
        &self,
        user_id: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> DiaryResult<PasswordChange> {
        validate_password(new_password)?;
        let (old_key, old_record) = self.check(user_id, old_password)?;
        let (new_record, new_key) = self.new_record(user_id, new_password, old_record.created_at)?;

        Ok(PasswordChange {
            old_key,
            new_key,
            old_record,
            new_record,
        })
    }

    /// Record the new entry key, sealed under the current one, so entries
    /// rewritten before [`CredentialStore::commit`] stay readable with the
    /// current password.
    pub fn stage(&self, change: &PasswordChange) -> DiaryResult<()> {
        let current = change.old_key.entry_key()?;
        let next = change.new_key.entry_key()?;
        let mut record = change.old_record.clone();
        record
            .pending_keys
            .push(envelope::seal_key(&current, &record.user_id, &next)?);
        self.users.replace_user(&record)?;
        debug!(user = %record.user_id, pending = record.pending_keys.len(), "staged password change");
        Ok(())
    }

    /// Put back the record as it was before [`CredentialStore::stage`].
    pub fn unstage(&self, change: &PasswordChange) -> DiaryResult<()> {
        self.users.replace_user(&change.old_record)?;
        debug!(user = %change.old_record.user_id, "discarded staged password change");
        Ok(())
    }

    /// Swap salt, parameters and token in one record write.
    pub fn commit(&self, change: &PasswordChange) -> DiaryResult<()> {
        self.users.replace_user(&change.new_record)?;
        info!(user = %change.new_record.user_id, "credentials rotated");
        Ok(())
    }

    fn check(&self, user_id: &str, password: &SecretString) -> DiaryResult<(MasterKey, UserRecord)> {
        validate_user_id(user_id)?;

        let record = self.users.load_user(user_id)?;
        let (salt, params, expected) = match &record {
            Some(record) => (record.salt, record.kdf_params, record.token),
            None => (DUMMY_SALT, self.params, self.dummy_token),
        };

        let key = crypto::derive_master_key_from_password(password, &salt, params)?;
        let matches = key.verification_token()?.ct_matches(&expected);

        match record {
            None => {
                warn!(user = %user_id, "login for unknown user");
                Err(DiaryError::UserNotFound)
            }
            Some(_) if !matches => {
                warn!(user = %user_id, "wrong password");
                Err(DiaryError::WrongPassword)
            }
            Some(record) => {
                debug!(user = %user_id, "password verified");
                Ok((key, record))
            }
        }
    }

    fn new_record(
        &self,
        user_id: &str,
        password: &SecretString,
        created_at: u64,
    ) -> DiaryResult<(UserRecord, MasterKey)> {
        let salt = crypto::generate_salt();
        let key = crypto::derive_master_key_from_password(password, &salt, self.params)?;
        let record = UserRecord {
            user_id: user_id.to_string(),
            salt,
            token: key.verification_token()?,
            kdf_params: self.params,
            created_at,
            pending_keys: Vec::new(),
        };
        Ok((record, key))
    }
}

/// Open the staged keys in `record`; any that fail to open are skipped.
pub(crate) fn pending_keys(entry_key: &EntryKey, record: &UserRecord) -> Vec<EntryKey> {
    record
        .pending_keys
        .iter()
        .filter_map(|sealed| match envelope::open_key(entry_key, &record.user_id, sealed) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(user = %record.user_id, error = %err, "ignoring unreadable staged key");
                None
            }
        })
        .collect()
}

pub(crate) fn validate_user_id(user_id: &str) -> DiaryResult<()> {
    if !is_valid_id(user_id) {
        return Err(DiaryError::InvalidInput("malformed user id"));
    }
    Ok(())
}

fn validate_password(password: &SecretString) -> DiaryResult<()> {
    if password.expose_secret().is_empty() {
        return Err(DiaryError::InvalidInput("password cannot be empty"));
    }
    Ok(())
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
