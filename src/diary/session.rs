//! Unlocked-session state.
//!
//! A [`Session`] is the only owner of a user's entry key. It moves
//! `LoggedIn -> LoggedOut` on `lock`, on `Diary::logout`, on drop, or on the
//! first key access after its idle timeout; it never moves back. Dropping the
//! key zeroes it.
//!
//! Besides the entry key a session may hold previous keys: those staged by a
//! password change that did not finish. They only ever open envelopes; new
//! envelopes are always sealed under the entry key.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use crate::diary::crypto::EntryKey;
use crate::diary::error::{DiaryError, DiaryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    LoggedIn,
    LoggedOut,
}

enum State {
    LoggedIn {
        key: EntryKey,
        previous: Vec<EntryKey>,
        last_activity: Instant,
    },
    LoggedOut,
}

pub struct Session {
    user_id: String,
    idle_timeout: Option<Duration>,
    state: Mutex<State>,
}

impl Session {
    pub(crate) fn start(user_id: &str, key: EntryKey, idle_timeout: Option<Duration>) -> Self {
        Self {
            user_id: user_id.to_string(),
            idle_timeout,
            state: Mutex::new(State::LoggedIn {
                key,
                previous: Vec::new(),
                last_activity: Instant::now(),
            }),
        }
    }

    pub(crate) fn with_previous_keys(mut self, keys: Vec<EntryKey>) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::LoggedIn { previous, .. } = state {
            *previous = keys;
        }
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Current status; applies the idle timeout without touching activity.
    pub fn status(&self) -> SessionStatus {
        let mut state = self.state();
        if self.expire_if_idle(&mut state) {
            return SessionStatus::LoggedOut;
        }
        match *state {
            State::LoggedIn { .. } => SessionStatus::LoggedIn,
            State::LoggedOut => SessionStatus::LoggedOut,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::LoggedIn
    }

    /// Force `LoggedOut`, dropping the key. Idempotent.
    pub fn lock(&self) {
        let mut state = self.state();
        if matches!(*state, State::LoggedIn { .. }) {
            info!(user = %self.user_id, "session locked");
        }
        *state = State::LoggedOut;
    }

    /// Run `f` with the entry key, refreshing the idle timer.
    ///
    /// The key stays behind the session's mutex for the duration of `f`, so a
    /// concurrent `lock` waits for in-flight cipher work.
    pub(crate) fn with_key<T>(&self, f: impl FnOnce(&EntryKey) -> T) -> DiaryResult<T> {
        self.with_keyring(|key, _| f(key))
    }

    /// Like [`Session::with_key`], also passing the previous keys.
    pub(crate) fn with_keyring<T>(
        &self,
        f: impl FnOnce(&EntryKey, &[EntryKey]) -> T,
    ) -> DiaryResult<T> {
        let mut state = self.state();
        if self.expire_if_idle(&mut state) {
            return Err(DiaryError::SessionExpired);
        }
        match &mut *state {
            State::LoggedIn {
                key,
                previous,
                last_activity,
            } => {
                *last_activity = Instant::now();
                Ok(f(key, previous))
            }
            State::LoggedOut => Err(DiaryError::NotLoggedIn),
        }
    }

    /// Swap in the key derived from a new password. Previous keys are
    /// dropped: every envelope is now under `new_key`.
    pub(crate) fn replace_key(&self, new_key: EntryKey) -> DiaryResult<()> {
        let mut state = self.state();
        match &mut *state {
            State::LoggedIn {
                key,
                previous,
                last_activity,
            } => {
                *key = new_key;
                previous.clear();
                *last_activity = Instant::now();
                Ok(())
            }
            State::LoggedOut => Err(DiaryError::NotLoggedIn),
        }
    }

    /// Keep `extra` for opening envelopes. No-op once logged out.
    pub(crate) fn remember_key(&self, extra: EntryKey) {
        if let State::LoggedIn { previous, .. } = &mut *self.state() {
            previous.push(extra);
        }
    }

    fn expire_if_idle(&self, state: &mut State) -> bool {
        let Some(timeout) = self.idle_timeout else {
            return false;
        };
        let idle = matches!(
            state,
            State::LoggedIn { last_activity, .. } if last_activity.elapsed() >= timeout
        );
        if idle {
            info!(user = %self.user_id, "session expired after idle timeout");
            *state = State::LoggedOut;
        }
        idle
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("logged_in", &matches!(*self.state(), State::LoggedIn { .. }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn lock_moves_to_logged_out_and_blocks_key_access() {
        let session = Session::start("alice", EntryKey::random(), None);
        assert!(session.is_active());
        assert!(session.with_key(|_| ()).is_ok());

        session.lock();
        assert_eq!(session.status(), SessionStatus::LoggedOut);
        assert!(matches!(session.with_key(|_| ()), Err(DiaryError::NotLoggedIn)));
        assert!(matches!(
            session.replace_key(EntryKey::random()),
            Err(DiaryError::NotLoggedIn)
        ));
    }

    #[test]
    fn idle_timeout_expires_once_then_reports_logged_out() {
        let session = Session::start("alice", EntryKey::random(), Some(Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(40));

        assert!(matches!(session.with_key(|_| ()), Err(DiaryError::SessionExpired)));
        assert!(matches!(session.with_key(|_| ()), Err(DiaryError::NotLoggedIn)));
        assert!(!session.is_active());
    }

    #[test]
    fn activity_refreshes_idle_timer() {
        let session = Session::start("alice", EntryKey::random(), Some(Duration::from_millis(300)));
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(100));
            assert!(session.with_key(|_| ()).is_ok());
        }
    }

    #[test]
    fn previous_keys_are_kept_until_the_key_is_replaced() {
        let session = Session::start("alice", EntryKey::random(), None)
            .with_previous_keys(vec![EntryKey::random()]);
        session.remember_key(EntryKey::random());
        assert_eq!(session.with_keyring(|_, previous| previous.len()).unwrap(), 2);

        let next = EntryKey::random();
        let expected = next.expose().to_vec();
        session.replace_key(next).unwrap();
        let (primary, previous) = session
            .with_keyring(|key, previous| (key.expose().to_vec(), previous.len()))
            .unwrap();
        assert_eq!(primary, expected);
        assert_eq!(previous, 0);

        session.lock();
        session.remember_key(EntryKey::random());
        assert!(matches!(
            session.with_keyring(|_, _| ()),
            Err(DiaryError::NotLoggedIn)
        ));
    }

    #[test]
    fn debug_does_not_print_key() {
        let session = Session::start("alice", EntryKey::random(), None);
        let rendered = format!("{session:?}");
        assert!(rendered.contains("alice"));
        assert!(rendered.contains("logged_in: true"));
    }
}
