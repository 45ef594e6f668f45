//! Key derivation for diary users.
//!
//! Design notes:
//!
//! - KDF: Argon2id turns the user's password + per-user salt into a 32-byte
//!   master key. It is deliberately slow and memory-hard; the parameters are
//!   stored in the user record so later logins derive with the same cost.
//! - Key separation: HKDF-SHA256 expands the master key into two independent
//!   values. The entry key encrypts diary entries; the verification token is
//!   persisted and lets us check a password without storing it or any key.
//! - The master key never leaves this module's callers' stack frames: the
//!   session only ever holds the entry key.
//!
//! Never log or print keys, tokens derived from unverified input, or
//! passwords.

use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

/// Size (bytes) of the Argon2id output and of every derived key.
pub const KEY_LEN: usize = 32;
/// Size (bytes) of the per-user salt.
pub const SALT_LEN: usize = 16;
/// Size (bytes) of the persisted verification token.
pub const TOKEN_LEN: usize = 32;

const HKDF_INFO_ENTRY_KEY: &[u8] = b"quietquill/v1/entry-key";
const HKDF_INFO_VERIFIER: &[u8] = b"quietquill/v1/verifier";

/// Secret bytes held in memory with zeroize-on-drop semantics.
pub type SecretBytes = SecretSlice<u8>;

pub type Salt = [u8; SALT_LEN];

/// Largest Argon2 memory cost accepted from a record or config: 4 GiB.
pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Argon2id tuning parameters (persisted in every user record).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Interactive default: roughly a few hundred milliseconds on a laptop.
    pub fn recommended() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }

    pub fn for_tests() -> Self {
        Self {
            memory_kib: 8 * 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn validate(self) -> Result<(), CryptoError> {
        if self.parallelism == 0
            || self.iterations == 0
            || self.memory_kib < 8 * self.parallelism
            || self.memory_kib > MAX_MEMORY_KIB
        {
            return Err(CryptoError::InvalidParams(self));
        }
        Ok(())
    }

    fn to_argon2_params(self) -> Result<Argon2Params, CryptoError> {
        self.validate()?;
        Ok(Argon2Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )?)
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::recommended()
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid argon2 parameters {0:?}")]
    InvalidParams(KdfParams),

    #[error("argon2 error")]
    Argon2(#[from] argon2::Error),

    #[error("hkdf error")]
    Hkdf,

    #[error("aead error")]
    Aead,

    #[error("wrapped key has the wrong length")]
    KeyLength,
}

/// Generate `N` cryptographically-secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub fn generate_salt() -> Salt {
    random_bytes::<SALT_LEN>()
}

/// Output of Argon2id for one (password, salt, params) triple.
#[derive(Debug)]
pub struct MasterKey(SecretBytes);

impl MasterKey {
    /// Expand the key the entry cipher uses.
    pub fn entry_key(&self) -> Result<EntryKey, CryptoError> {
        Ok(EntryKey(expand(&self.0, HKDF_INFO_ENTRY_KEY)?))
    }

    /// Expand the value persisted to check future logins.
    pub fn verification_token(&self) -> Result<VerificationToken, CryptoError> {
        let okm = expand(&self.0, HKDF_INFO_VERIFIER)?;
        let mut token = [0u8; TOKEN_LEN];
        token.copy_from_slice(okm.expose_secret());
        Ok(VerificationToken(token))
    }
}

/// Symmetric key for entry envelopes. Only ever owned by a live session.
#[derive(Debug)]
pub struct EntryKey(SecretBytes);

impl EntryKey {
    /// A key that no password derives; useful for tests and throwaway data.
    pub fn random() -> Self {
        Self(SecretBytes::from(random_bytes::<KEY_LEN>().to_vec()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::KeyLength);
        }
        Ok(Self(SecretBytes::from(bytes.to_vec())))
    }

    pub(crate) fn duplicate(&self) -> Self {
        Self(SecretBytes::from(self.expose().to_vec()))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerificationToken([u8; TOKEN_LEN]);

impl VerificationToken {
    pub fn from_bytes(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }

    pub fn ct_matches(&self, other: &VerificationToken) -> bool {
        bool::from(self.0[..].ct_eq(&other.0[..]))
    }
}

impl std::fmt::Debug for VerificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VerificationToken(..)")
    }
}

/// Derive the master key from a password using Argon2id.
///
/// Deterministic for identical inputs. The salt's type fixes its length, so a
/// short or long salt is unrepresentable here.
pub fn derive_master_key(
    password: &[u8],
    salt: &Salt,
    params: KdfParams,
) -> Result<MasterKey, CryptoError> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2_params()?);

    let mut out = vec![0u8; KEY_LEN];
    argon2.hash_password_into(password, salt, &mut out)?;
    debug!(
        memory_kib = params.memory_kib,
        iterations = params.iterations,
        "derived master key"
    );
    Ok(MasterKey(SecretBytes::from(out)))
}

/// Convenience wrapper for `derive_master_key` using a `SecretString`.
pub fn derive_master_key_from_password(
    password: &SecretString,
    salt: &Salt,
    params: KdfParams,
) -> Result<MasterKey, CryptoError> {
    derive_master_key(password.expose_secret().as_bytes(), salt, params)
}

fn expand(master: &SecretBytes, info: &[u8]) -> Result<SecretBytes, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, master.expose_secret());

    let mut okm = vec![0u8; KEY_LEN];
    hk.expand(info, &mut okm).map_err(|_| CryptoError::Hkdf)?;
    Ok(SecretBytes::from(okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(password: &[u8], salt: &Salt) -> MasterKey {
        derive_master_key(password, salt, KdfParams::for_tests()).unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = generate_salt();
        let a = master(b"Secret123!", &salt);
        let b = master(b"Secret123!", &salt);
        assert_eq!(a.0.expose_secret(), b.0.expose_secret());
        assert_eq!(
            a.verification_token().unwrap(),
            b.verification_token().unwrap()
        );
    }

    #[test]
    fn salt_and_password_both_change_the_key() {
        let salt = generate_salt();
        let other_salt = generate_salt();
        let base = master(b"pw", &salt);

        assert_ne!(base.0.expose_secret(), master(b"pw", &other_salt).0.expose_secret());
        assert_ne!(base.0.expose_secret(), master(b"pw2", &salt).0.expose_secret());
    }

    #[test]
    fn token_and_entry_key_are_independent_of_master() {
        let salt = generate_salt();
        let key = master(b"pw", &salt);
        let entry = key.entry_key().unwrap();
        let token = key.verification_token().unwrap();

        assert_ne!(entry.expose(), key.0.expose_secret());
        assert_ne!(&token.as_bytes()[..], key.0.expose_secret());
        assert_ne!(&token.as_bytes()[..], entry.expose());
        assert_ne!(&token.as_bytes()[..SALT_LEN], &salt[..]);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let params = KdfParams {
            memory_kib: 4,
            iterations: 1,
            parallelism: 1,
        };
        let err = derive_master_key(b"pw", &generate_salt(), params).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidParams(_)));

        let zero_iterations = KdfParams {
            iterations: 0,
            ..KdfParams::for_tests()
        };
        assert!(zero_iterations.validate().is_err());

        let at_cap = KdfParams {
            memory_kib: MAX_MEMORY_KIB,
            ..KdfParams::for_tests()
        };
        assert!(at_cap.validate().is_ok());
        let oversized = KdfParams {
            memory_kib: u32::MAX,
            ..KdfParams::for_tests()
        };
        let err = derive_master_key(b"pw", &generate_salt(), oversized).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidParams(_)));
    }

    #[test]
    fn entry_key_from_bytes_checks_length() {
        let key = EntryKey::random();
        let copy = EntryKey::from_bytes(key.expose()).unwrap();
        assert_eq!(copy.expose(), key.expose());
        assert_eq!(key.duplicate().expose(), key.expose());
        assert!(matches!(
            EntryKey::from_bytes(&[0u8; KEY_LEN - 1]),
            Err(CryptoError::KeyLength)
        ));
    }

    #[test]
    fn token_comparison_detects_single_byte_change() {
        let token = master(b"pw", &generate_salt()).verification_token().unwrap();
        let mut bytes = *token.as_bytes();
        bytes[TOKEN_LEN - 1] ^= 0x80;
        let other = VerificationToken::from_bytes(bytes);

        assert!(token.ct_matches(&token));
        assert!(!token.ct_matches(&other));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = EntryKey::random();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains(&format!("{:?}", key.expose())));
        assert_eq!(
            format!("{:?}", VerificationToken::from_bytes([7u8; TOKEN_LEN])),
            "VerificationToken(..)"
        );
    }
}
