use std::path::Path;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::diary::background::Pending;
use crate::diary::credentials::{CredentialStore, PasswordChange, now_unix, pending_keys};
use crate::diary::crypto::{EntryKey, KdfParams};
use crate::diary::envelope;
use crate::diary::error::{DiaryError, DiaryResult};
use crate::diary::locks::LockTable;
use crate::diary::session::Session;
use crate::diary::store::{
    EntryRecord, EntryStore, FileEntryStore, FileUserStore, StoreError, UserStore, is_valid_id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiaryOptions {
    pub kdf_params: KdfParams,
    pub idle_timeout: Option<Duration>,
}

impl Default for DiaryOptions {
    fn default() -> Self {
        Self {
            kdf_params: KdfParams::recommended(),
            idle_timeout: None,
        }
    }
}

/// Identifier and timestamps of a stored entry; readable without a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub entry_id: String,
    pub created_at: u64,
    pub modified_at: u64,
}

impl From<&EntryRecord> for EntryInfo {
    fn from(record: &EntryRecord) -> Self {
        Self {
            entry_id: record.entry_id.clone(),
            created_at: record.created_at,
            modified_at: record.modified_at,
        }
    }
}

/// The diary core: credentials, sessions and encrypted entries.
pub struct Diary {
    credentials: CredentialStore,
    entries: Arc<dyn EntryStore>,
    locks: LockTable,
    idle_timeout: Option<Duration>,
}

impl Diary {
    pub fn new(
        users: Arc<dyn UserStore>,
        entries: Arc<dyn EntryStore>,
        options: DiaryOptions,
    ) -> Self {
        Self {
            credentials: CredentialStore::new(users, options.kdf_params),
            entries,
            locks: LockTable::new(),
            idle_timeout: options.idle_timeout,
        }
    }

    /// A diary backed by the file stores under `data_dir`.
    pub fn open_dir(data_dir: &Path, options: DiaryOptions) -> Self {
        debug!(data_dir = %data_dir.display(), "opening diary");
        Self::new(
            Arc::new(FileUserStore::new(data_dir)),
            Arc::new(FileEntryStore::new(data_dir)),
            options,
        )
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn register(&self, user_id: &str, password: &SecretString) -> DiaryResult<()> {
        self.credentials.register(user_id, password)
    }

    pub fn login(&self, user_id: &str, password: &SecretString) -> DiaryResult<Session> {
        let (key, pending) = self.credentials.unlock(user_id, password)?;
        if !pending.is_empty() {
            warn!(
                user = %user_id,
                staged = pending.len(),
                "unfinished password change; run it again to finish"
            );
        }
        let session = Session::start(user_id, key, self.idle_timeout).with_previous_keys(pending);
        info!(user = %user_id, "logged in");
        Ok(session)
    }

    /// End the session; its key is dropped and zeroed.
    pub fn logout(&self, session: Session) {
        session.lock();
        info!(user = %session.user_id(), "logged out");
    }

    /// Run `login` on a worker thread.
    pub fn login_in_background(
        self: &Arc<Self>,
        user_id: &str,
        password: SecretString,
    ) -> Pending<DiaryResult<Session>> {
        let diary = Arc::clone(self);
        let user_id = user_id.to_string();
        Pending::spawn("login", move || diary.login(&user_id, &password))
    }

    /// Run `register` on a worker thread.
    pub fn register_in_background(
        self: &Arc<Self>,
        user_id: &str,
        password: SecretString,
    ) -> Pending<DiaryResult<()>> {
        let diary = Arc::clone(self);
        let user_id = user_id.to_string();
        Pending::spawn("register", move || diary.register(&user_id, &password))
    }

    /// Run `change_password` on a worker thread. The session comes back with
    /// the outcome, holding the new key on success.
    pub fn change_password_in_background(
        self: &Arc<Self>,
        session: Session,
        old_password: SecretString,
        new_password: SecretString,
    ) -> Pending<(Session, DiaryResult<()>)> {
        let diary = Arc::clone(self);
        Pending::spawn("change-password", move || {
            let result = diary.change_password(&session, &old_password, &new_password);
            (session, result)
        })
    }

    /// Encrypt and store `plaintext` under `entry_id`, replacing any previous
    /// envelope. Each call uses a fresh nonce.
    pub fn save_entry(
        &self,
        session: &Session,
        entry_id: &str,
        plaintext: &[u8],
    ) -> DiaryResult<EntryInfo> {
        validate_entry_id(entry_id)?;
        let user_id = session.user_id();

        let user_lock = self.locks.user(user_id);
        let _shared = user_lock.read().unwrap_or_else(PoisonError::into_inner);
        let entry_lock = self.locks.entry(user_id, entry_id);
        let _exclusive = entry_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let aad = envelope::entry_aad(user_id, entry_id);
        let sealed = session.with_key(|key| envelope::encrypt(key, &aad, plaintext))??;

        let now = now_unix();
        let created_at = match self.entries.get_entry(user_id, entry_id) {
            Ok(Some(existing)) => existing.created_at,
            Ok(None) | Err(StoreError::Format(_)) => now,
            Err(err) => return Err(err.into()),
        };

        let record = EntryRecord {
            user_id: user_id.to_string(),
            entry_id: entry_id.to_string(),
            envelope: sealed,
            created_at,
            modified_at: now,
        };
        self.entries.put_entry(&record)?;
        debug!(user = %user_id, entry = %entry_id, "saved entry");
        Ok(EntryInfo::from(&record))
    }

    pub fn read_entry(&self, session: &Session, entry_id: &str) -> DiaryResult<Zeroizing<Vec<u8>>> {
        validate_entry_id(entry_id)?;
        let user_id = session.user_id();

        let user_lock = self.locks.user(user_id);
        let _shared = user_lock.read().unwrap_or_else(PoisonError::into_inner);
        let entry_lock = self.locks.entry(user_id, entry_id);
        let _exclusive = entry_lock.lock().unwrap_or_else(PoisonError::into_inner);

        session.with_keyring(|key, previous| {
            self.open_entry(key, previous, user_id, entry_id)
        })?
    }

    pub fn delete_entry(&self, session: &Session, entry_id: &str) -> DiaryResult<()> {
        validate_entry_id(entry_id)?;
        session.with_key(|_| ())?;
        let user_id = session.user_id();

        let user_lock = self.locks.user(user_id);
        let _shared = user_lock.read().unwrap_or_else(PoisonError::into_inner);
        let entry_lock = self.locks.entry(user_id, entry_id);
        let _exclusive = entry_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.entries.delete_entry(user_id, entry_id)? {
            return Err(DiaryError::EntryNotFound(entry_id.to_string()));
        }
        info!(user = %user_id, entry = %entry_id, "deleted entry");
        Ok(())
    }

    /// Identifiers and timestamps of every entry, without decrypting.
    pub fn entries(&self, session: &Session) -> DiaryResult<Vec<EntryInfo>> {
        session.with_key(|_| ())?;
        let user_id = session.user_id();

        let user_lock = self.locks.user(user_id);
        let _shared = user_lock.read().unwrap_or_else(PoisonError::into_inner);

        let mut infos = Vec::new();
        for entry_id in self.entries.list_entry_ids(user_id)? {
            match self.entries.get_entry(user_id, &entry_id) {
                Ok(Some(record)) => infos.push(EntryInfo::from(&record)),
                Ok(None) => {}
                Err(StoreError::Format(err)) => {
                    warn!(user = %user_id, entry = %entry_id, error = %err, "skipping malformed entry");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(infos)
    }

    /// Rotate the password and re-encrypt every entry under the new key.
    ///
    /// The new key is staged in the user record before any entry is
    /// rewritten. If a write fails the old envelopes are put back; whatever
    /// cannot be put back stays readable with the old password through the
    /// staged key, and the old password stays the valid one.
    pub fn change_password(
        &self,
        session: &Session,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> DiaryResult<()> {
        session.with_key(|_| ())?;
        let user_id = session.user_id();

        let user_lock = self.locks.user(user_id);
        let _exclusive = user_lock.write().unwrap_or_else(PoisonError::into_inner);

        let change = self
            .credentials
            .begin_change(user_id, old_password, new_password)?;
        let old_key = change.old_key.entry_key()?;
        let old_previous = pending_keys(&old_key, &change.old_record);
        let new_key = change.new_key.entry_key()?;

        let mut snapshot = Vec::new();
        for entry_id in self.entries.list_entry_ids(user_id)? {
            match self.entries.get_entry(user_id, &entry_id) {
                Ok(Some(record)) => snapshot.push(record),
                Ok(None) => {}
                Err(StoreError::Format(_)) => {
                    return Err(DiaryError::IntegrityFailure(entry_id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        let now = now_unix();
        let mut migrated = Vec::with_capacity(snapshot.len());
        for record in &snapshot {
            let aad = envelope::entry_aad(user_id, &record.entry_id);
            let keys = std::iter::once(&old_key).chain(&old_previous);
            let plaintext = envelope::decrypt_any(keys, &aad, &record.envelope)
                .map_err(|_| DiaryError::IntegrityFailure(record.entry_id.clone()))?;
            migrated.push(EntryRecord {
                envelope: envelope::encrypt(&new_key, &aad, &plaintext)?,
                modified_at: now,
                ..record.clone()
            });
        }

        self.credentials.stage(&change)?;

        for (written, record) in migrated.iter().enumerate() {
            if let Err(err) = self.entries.put_entry(record) {
                warn!(user = %user_id, written, error = %err, "entry migration failed, rolling back");
                self.roll_back(session, &change, &snapshot[..written], new_key);
                return Err(DiaryError::StorageUnavailable(err));
            }
        }

        if let Err(err) = self.credentials.commit(&change) {
            warn!(user = %user_id, error = %err, "credential swap failed, rolling back");
            self.roll_back(session, &change, &snapshot, new_key);
            return Err(err);
        }

        if session.replace_key(new_key).is_err() {
            debug!(user = %user_id, "session closed before the key swap");
        }
        info!(user = %user_id, entries = migrated.len(), "password changed");
        Ok(())
    }

    /// Put back the pre-change envelopes. The staged record is only undone
    /// once every one of them is back; until then the old password opens
    /// the rewritten entries through the staged key, as does `session`.
    fn roll_back(
        &self,
        session: &Session,
        change: &PasswordChange,
        records: &[EntryRecord],
        new_key: EntryKey,
    ) {
        let mut restored = true;
        for record in records {
            if let Err(err) = self.entries.put_entry(record) {
                restored = false;
                warn!(
                    user = %record.user_id,
                    entry = %record.entry_id,
                    error = %err,
                    "rollback write failed; entry stays under the staged key"
                );
            }
        }

        if !restored {
            session.remember_key(new_key);
            return;
        }
        if let Err(err) = self.credentials.unstage(change) {
            warn!(user = %session.user_id(), error = %err, "could not discard staged key");
        }
    }

    fn open_entry(
        &self,
        key: &EntryKey,
        previous: &[EntryKey],
        user_id: &str,
        entry_id: &str,
    ) -> DiaryResult<Zeroizing<Vec<u8>>> {
        let record = match self.entries.get_entry(user_id, entry_id) {
            Ok(Some(record)) => record,
            Ok(None) => return Err(DiaryError::EntryNotFound(entry_id.to_string())),
            Err(StoreError::Format(err)) => {
                warn!(user = %user_id, entry = %entry_id, error = %err, "malformed entry record");
                return Err(DiaryError::IntegrityFailure(entry_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let aad = envelope::entry_aad(user_id, entry_id);
        let keys = std::iter::once(key).chain(previous);
        envelope::decrypt_any(keys, &aad, &record.envelope).map_err(|_| {
            warn!(user = %user_id, entry = %entry_id, "entry failed authentication");
            DiaryError::IntegrityFailure(entry_id.to_string())
        })
    }
}

fn validate_entry_id(entry_id: &str) -> DiaryResult<()> {
    if !is_valid_id(entry_id) {
        return Err(DiaryError::InvalidInput("malformed entry id"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::diary::session::SessionStatus;
    use crate::diary::store::{MemoryEntryStore, MemoryUserStore, UserRecord};

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn diary() -> (Arc<MemoryEntryStore>, Diary) {
        let entries = Arc::new(MemoryEntryStore::new());
        let diary = Diary::new(
            Arc::new(MemoryUserStore::new()),
            entries.clone(),
            DiaryOptions {
                kdf_params: KdfParams::for_tests(),
                idle_timeout: None,
            },
        );
        (entries, diary)
    }

    #[test]
    fn save_keeps_created_at_and_bumps_modified_at() {
        let (entries, diary) = diary();
        diary.register("alice", &secret("pw")).unwrap();
        let session = diary.login("alice", &secret("pw")).unwrap();

        let first = diary.save_entry(&session, "d1", b"one").unwrap();
        let mut record = entries.get_entry("alice", "d1").unwrap().unwrap();
        record.created_at = 5;
        entries.put_entry(&record).unwrap();

        let second = diary.save_entry(&session, "d1", b"two").unwrap();
        assert_eq!(second.created_at, 5);
        assert!(second.modified_at >= first.modified_at);
        assert_eq!(diary.read_entry(&session, "d1").unwrap().as_slice(), b"two");
    }

    #[test]
    fn stored_bytes_never_contain_plaintext() {
        let (entries, diary) = diary();
        diary.register("alice", &secret("pw")).unwrap();
        let session = diary.login("alice", &secret("pw")).unwrap();
        diary.save_entry(&session, "d1", b"my deepest secret").unwrap();

        let record = entries.get_entry("alice", "d1").unwrap().unwrap();
        let encoded = crate::diary::format::encode_entry_record(&record);
        assert!(
            !encoded
                .windows(b"deepest".len())
                .any(|w| w == b"deepest")
        );
    }

    #[test]
    fn missing_and_invalid_entries() {
        let (_, diary) = diary();
        diary.register("alice", &secret("pw")).unwrap();
        let session = diary.login("alice", &secret("pw")).unwrap();

        assert!(matches!(
            diary.read_entry(&session, "nope"),
            Err(DiaryError::EntryNotFound(_))
        ));
        assert!(matches!(
            diary.delete_entry(&session, "nope"),
            Err(DiaryError::EntryNotFound(_))
        ));
        assert!(matches!(
            diary.save_entry(&session, "../escape", b"x"),
            Err(DiaryError::InvalidInput(_))
        ));
    }

    #[test]
    fn entries_lists_without_decrypting() {
        let (_, diary) = diary();
        diary.register("alice", &secret("pw")).unwrap();
        let session = diary.login("alice", &secret("pw")).unwrap();
        diary.save_entry(&session, "b", b"2").unwrap();
        diary.save_entry(&session, "a", b"1").unwrap();

        let ids: Vec<_> = diary
            .entries(&session)
            .unwrap()
            .into_iter()
            .map(|info| info.entry_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn tampered_entry_fails_only_that_entry() {
        let (entries, diary) = diary();
        diary.register("alice", &secret("pw")).unwrap();
        let session = diary.login("alice", &secret("pw")).unwrap();
        diary.save_entry(&session, "good", b"fine").unwrap();
        diary.save_entry(&session, "bad", b"will be flipped").unwrap();

        let mut record = entries.get_entry("alice", "bad").unwrap().unwrap();
        record.envelope.tag[0] ^= 0x01;
        entries.put_entry(&record).unwrap();

        assert!(matches!(
            diary.read_entry(&session, "bad"),
            Err(DiaryError::IntegrityFailure(id)) if id == "bad"
        ));
        assert!(session.is_active());
        assert_eq!(diary.read_entry(&session, "good").unwrap().as_slice(), b"fine");
    }

    #[test]
    fn change_password_aborts_on_corrupt_entry_without_writing() {
        let (entries, diary) = diary();
        diary.register("alice", &secret("old")).unwrap();
        let session = diary.login("alice", &secret("old")).unwrap();
        diary.save_entry(&session, "d1", b"keep me").unwrap();
        diary.save_entry(&session, "d2", b"tampered").unwrap();

        let mut record = entries.get_entry("alice", "d2").unwrap().unwrap();
        record.envelope.ciphertext[0] ^= 0x01;
        entries.put_entry(&record).unwrap();
        let before = entries.get_entry("alice", "d1").unwrap();

        assert!(matches!(
            diary.change_password(&session, &secret("old"), &secret("new")),
            Err(DiaryError::IntegrityFailure(id)) if id == "d2"
        ));
        assert_eq!(entries.get_entry("alice", "d1").unwrap(), before);
        assert!(diary.login("alice", &secret("old")).is_ok());
        assert!(diary.login("alice", &secret("new")).is_err());
    }

    #[test]
    fn background_login_yields_a_session() {
        let (_, diary) = diary();
        let diary = Arc::new(diary);
        diary
            .register_in_background("alice", secret("pw"))
            .wait()
            .unwrap()
            .unwrap();

        let session = diary
            .login_in_background("alice", secret("pw"))
            .wait()
            .unwrap()
            .unwrap();
        assert_eq!(session.user_id(), "alice");

        let failed = diary.login_in_background("alice", secret("nope")).wait().unwrap();
        assert!(matches!(failed, Err(DiaryError::WrongPassword)));

        diary.save_entry(&session, "d1", b"moved").unwrap();
        let (session, result) = diary
            .change_password_in_background(session, secret("pw"), secret("next"))
            .wait()
            .unwrap();
        result.unwrap();
        assert_eq!(diary.read_entry(&session, "d1").unwrap().as_slice(), b"moved");
        assert!(diary.login("alice", &secret("next")).is_ok());
    }

    /// Locks the parked session right after the rotated record is written.
    #[derive(Default)]
    struct LockOnCommit {
        inner: MemoryUserStore,
        session: Mutex<Option<Arc<Session>>>,
    }

    impl UserStore for LockOnCommit {
        fn load_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
            self.inner.load_user(user_id)
        }

        fn insert_user(&self, record: &UserRecord) -> Result<(), StoreError> {
            self.inner.insert_user(record)
        }

        fn replace_user(&self, record: &UserRecord) -> Result<(), StoreError> {
            self.inner.replace_user(record)?;
            if record.pending_keys.is_empty() {
                if let Some(session) = self.session.lock().unwrap().take() {
                    session.lock();
                }
            }
            Ok(())
        }
    }

    #[test]
    fn change_password_succeeds_when_session_locks_after_commit() {
        let users = Arc::new(LockOnCommit::default());
        let diary = Diary::new(
            users.clone(),
            Arc::new(MemoryEntryStore::new()),
            DiaryOptions {
                kdf_params: KdfParams::for_tests(),
                idle_timeout: None,
            },
        );
        diary.register("alice", &secret("old")).unwrap();
        let session = Arc::new(diary.login("alice", &secret("old")).unwrap());
        diary.save_entry(&session, "d1", b"kept").unwrap();

        *users.session.lock().unwrap() = Some(Arc::clone(&session));
        diary
            .change_password(&session, &secret("old"), &secret("new"))
            .unwrap();
        assert_eq!(session.status(), SessionStatus::LoggedOut);

        let fresh = diary.login("alice", &secret("new")).unwrap();
        assert_eq!(diary.read_entry(&fresh, "d1").unwrap().as_slice(), b"kept");
        assert!(matches!(
            diary.login("alice", &secret("old")),
            Err(DiaryError::WrongPassword)
        ));
    }
}
