//! Entry cipher: XChaCha20-Poly1305 envelopes for single diary entries.
//!
//! Every call to [`encrypt`] draws a fresh 24-byte nonce from the OS RNG, so
//! re-saving unchanged content still yields a new envelope. The tag is kept
//! detached from the ciphertext because the entry record stores them as
//! separate fixed-width fields.
//!
//! Associated data ties an envelope to `(user_id, entry_id)`; an envelope
//! copied under another identifier fails authentication.
//!
//! The same cipher wraps the entry key of an unfinished password change so
//! the user record can carry it (see [`seal_key`]).

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Tag, XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

use crate::diary::crypto::{self, CryptoError, EntryKey};

/// Size (bytes) of XChaCha20-Poly1305 nonces.
pub const XCHACHA_NONCE_LEN: usize = 24;
/// Size (bytes) of the Poly1305 tag.
pub const TAG_LEN: usize = 16;

const AAD_LABEL: &[u8] = b"quietquill/entry/v1";
const KEY_AAD_LABEL: &[u8] = b"quietquill/pending-key/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: [u8; XCHACHA_NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Associated data binding an envelope to its owner and identifier.
pub fn entry_aad(user_id: &str, entry_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_LABEL.len() + 8 + user_id.len() + entry_id.len());
    aad.extend_from_slice(AAD_LABEL);
    aad.extend_from_slice(&(user_id.len() as u32).to_le_bytes());
    aad.extend_from_slice(user_id.as_bytes());
    aad.extend_from_slice(&(entry_id.len() as u32).to_le_bytes());
    aad.extend_from_slice(entry_id.as_bytes());
    aad
}

fn key_aad(user_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(KEY_AAD_LABEL.len() + 4 + user_id.len());
    aad.extend_from_slice(KEY_AAD_LABEL);
    aad.extend_from_slice(&(user_id.len() as u32).to_le_bytes());
    aad.extend_from_slice(user_id.as_bytes());
    aad
}

pub fn encrypt(key: &EntryKey, aad: &[u8], plaintext: &[u8]) -> Result<Envelope, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.expose()).map_err(|_| CryptoError::Aead)?;
    let nonce = crypto::random_bytes::<XCHACHA_NONCE_LEN>();

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), aad, &mut ciphertext)
        .map_err(|_| CryptoError::Aead)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok(Envelope {
        nonce,
        ciphertext,
        tag: tag_bytes,
    })
}

/// Decrypt an envelope. Fails closed: a wrong key, a modified byte anywhere in
/// the envelope or mismatched associated data all return `CryptoError::Aead`
/// and no plaintext.
pub fn decrypt(
    key: &EntryKey,
    aad: &[u8],
    envelope: &Envelope,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.expose()).map_err(|_| CryptoError::Aead)?;

    let mut buffer = Zeroizing::new(envelope.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(&envelope.nonce),
            aad,
            buffer.as_mut_slice(),
            Tag::from_slice(&envelope.tag),
        )
        .map_err(|_| CryptoError::Aead)?;
    Ok(buffer)
}

/// Try each key in turn; the first that authenticates wins.
pub fn decrypt_any<'k>(
    keys: impl IntoIterator<Item = &'k EntryKey>,
    aad: &[u8],
    envelope: &Envelope,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    keys.into_iter()
        .find_map(|key| decrypt(key, aad, envelope).ok())
        .ok_or(CryptoError::Aead)
}

/// Wrap `key` under `wrapping` for storage in `user_id`'s record.
pub fn seal_key(wrapping: &EntryKey, user_id: &str, key: &EntryKey) -> Result<Envelope, CryptoError> {
    encrypt(wrapping, &key_aad(user_id), key.expose())
}

pub fn open_key(
    wrapping: &EntryKey,
    user_id: &str,
    sealed: &Envelope,
) -> Result<EntryKey, CryptoError> {
    let bytes = decrypt(wrapping, &key_aad(user_id), sealed)?;
    EntryKey::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAD: &[u8] = b"aad";

    #[test]
    fn roundtrip_including_empty_plaintext() {
        let key = EntryKey::random();
        for plaintext in [&b""[..], b"Dear diary...", &[0u8; 4096][..]] {
            let envelope = encrypt(&key, AAD, plaintext).unwrap();
            assert_eq!(envelope.ciphertext.len(), plaintext.len());
            let opened = decrypt(&key, AAD, &envelope).unwrap();
            assert_eq!(opened.as_slice(), plaintext);
        }
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let key = EntryKey::random();
        let envelope = encrypt(&key, AAD, b"short entry").unwrap();

        for byte in 0..envelope.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = envelope.clone();
                tampered.ciphertext[byte] ^= 1 << bit;
                assert!(matches!(decrypt(&key, AAD, &tampered), Err(CryptoError::Aead)));
            }
        }
        for byte in 0..TAG_LEN {
            for bit in 0..8 {
                let mut tampered = envelope.clone();
                tampered.tag[byte] ^= 1 << bit;
                assert!(matches!(decrypt(&key, AAD, &tampered), Err(CryptoError::Aead)));
            }
        }
        for byte in 0..XCHACHA_NONCE_LEN {
            let mut tampered = envelope.clone();
            tampered.nonce[byte] ^= 0x01;
            assert!(decrypt(&key, AAD, &tampered).is_err());
        }
    }

    #[test]
    fn truncation_is_detected() {
        let key = EntryKey::random();
        let mut envelope = encrypt(&key, AAD, b"a longer entry body").unwrap();
        envelope.ciphertext.pop();
        assert!(decrypt(&key, AAD, &envelope).is_err());

        envelope.ciphertext.clear();
        assert!(decrypt(&key, AAD, &envelope).is_err());
    }

    #[test]
    fn wrong_keys_never_decrypt() {
        for _ in 0..500 {
            let k1 = EntryKey::random();
            let k2 = EntryKey::random();
            let envelope = encrypt(&k1, AAD, b"P").unwrap();
            assert!(decrypt(&k2, AAD, &envelope).is_err());
        }
    }

    #[test]
    fn same_plaintext_gets_fresh_nonce_and_ciphertext() {
        let key = EntryKey::random();
        let a = encrypt(&key, AAD, b"unchanged content").unwrap();
        let b = encrypt(&key, AAD, b"unchanged content").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn envelope_is_bound_to_its_identifier() {
        let key = EntryKey::random();
        let envelope = encrypt(&key, &entry_aad("alice", "d1"), b"x").unwrap();

        assert!(decrypt(&key, &entry_aad("alice", "d1"), &envelope).is_ok());
        assert!(decrypt(&key, &entry_aad("alice", "d2"), &envelope).is_err());
        assert!(decrypt(&key, &entry_aad("bob", "d1"), &envelope).is_err());
    }

    #[test]
    fn decrypt_any_tries_every_key() {
        let (old, new) = (EntryKey::random(), EntryKey::random());
        let envelope = encrypt(&new, AAD, b"moved").unwrap();

        let opened = decrypt_any([&old, &new], AAD, &envelope).unwrap();
        assert_eq!(opened.as_slice(), b"moved");
        assert!(decrypt_any([&old], AAD, &envelope).is_err());
        assert!(decrypt_any(std::iter::empty::<&EntryKey>(), AAD, &envelope).is_err());
    }

    #[test]
    fn sealed_key_opens_only_for_its_owner() {
        let (wrapping, key) = (EntryKey::random(), EntryKey::random());
        let sealed = seal_key(&wrapping, "alice", &key).unwrap();
        assert_eq!(sealed.ciphertext.len(), crypto::KEY_LEN);

        let opened = open_key(&wrapping, "alice", &sealed).unwrap();
        assert_eq!(opened.expose(), key.expose());
        assert!(open_key(&wrapping, "bob", &sealed).is_err());
        assert!(open_key(&EntryKey::random(), "alice", &sealed).is_err());
    }

    #[test]
    fn aad_is_length_prefixed() {
        assert_ne!(entry_aad("ab", "c"), entry_aad("a", "bc"));
    }
}
