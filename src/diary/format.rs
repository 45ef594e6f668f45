use crate::diary::crypto::{self, KdfParams, VerificationToken};
use crate::diary::envelope::{Envelope, TAG_LEN, XCHACHA_NONCE_LEN};
use crate::diary::store::{EntryRecord, UserRecord};
use thiserror::Error;

pub const USER_MAGIC: &[u8; 8] = b"QQUSERV1";
pub const ENTRY_MAGIC: &[u8; 8] = b"QQENTRY1";
pub const VERSION_V1: u16 = 1;
pub const FIXED_HEADER_LEN: usize = 8 + 2 + 4;

const TLV_USER_ID: u16 = 0x0001;
const TLV_ARGON2_PARAMS: u16 = 0x0002;
const TLV_KDF_SALT: u16 = 0x0003;
const TLV_KDF_ALG: u16 = 0x0004;
const TLV_VERIFIER: u16 = 0x0005;
const TLV_PENDING_KEY: u16 = 0x0006;
const TLV_ENTRY_ID: u16 = 0x0010;
const TLV_AEAD_ALG: u16 = 0x0011;
const TLV_NONCE: u16 = 0x0012;
const TLV_CIPHERTEXT: u16 = 0x0013;
const TLV_TAG: u16 = 0x0014;
const TLV_CREATED_AT: u16 = 0x0020;
const TLV_MODIFIED_AT: u16 = 0x0021;

/// Sealed pending key: nonce, tag, then the wrapped key.
const PENDING_KEY_LEN: usize = XCHACHA_NONCE_LEN + TAG_LEN + crypto::KEY_LEN;

const KDF_ALG_ARGON2ID: &[u8] = b"argon2id";
const AEAD_ALG_XCHACHA20POLY1305: &[u8] = b"xchacha20poly1305";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("record too small")]
    TooSmall,

    #[error("invalid magic")]
    InvalidMagic,

    #[error("unsupported record version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid record length")]
    InvalidLength,

    #[error("truncated field")]
    Truncated,

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid field {0}")]
    InvalidField(&'static str),
}

pub fn encode_user_record(record: &UserRecord) -> Vec<u8> {
    let mut tlvs = Vec::new();
    push_tlv(&mut tlvs, TLV_USER_ID, record.user_id.as_bytes());

    let mut params = Vec::with_capacity(16);
    params.extend_from_slice(&record.kdf_params.memory_kib.to_le_bytes());
    params.extend_from_slice(&record.kdf_params.iterations.to_le_bytes());
    params.extend_from_slice(&record.kdf_params.parallelism.to_le_bytes());
    params.extend_from_slice(&(crypto::KEY_LEN as u32).to_le_bytes());
    push_tlv(&mut tlvs, TLV_ARGON2_PARAMS, &params);

    push_tlv(&mut tlvs, TLV_KDF_ALG, KDF_ALG_ARGON2ID);
    push_tlv(&mut tlvs, TLV_KDF_SALT, &record.salt);
    push_tlv(&mut tlvs, TLV_VERIFIER, record.token.as_bytes());
    push_tlv(&mut tlvs, TLV_CREATED_AT, &record.created_at.to_le_bytes());
    for sealed in &record.pending_keys {
        let mut value = Vec::with_capacity(PENDING_KEY_LEN);
        value.extend_from_slice(&sealed.nonce);
        value.extend_from_slice(&sealed.tag);
        value.extend_from_slice(&sealed.ciphertext);
        push_tlv(&mut tlvs, TLV_PENDING_KEY, &value);
    }

    frame(USER_MAGIC, &tlvs)
}

pub fn decode_user_record(bytes: &[u8]) -> Result<UserRecord, FormatError> {
    let fields = parse(USER_MAGIC, bytes)?;

    let alg = fields.require(TLV_KDF_ALG, "kdf_alg")?;
    if alg != KDF_ALG_ARGON2ID {
        return Err(FormatError::InvalidField("kdf_alg"));
    }

    let params: [u8; 16] = fields.fixed(TLV_ARGON2_PARAMS, "argon2_params")?;
    let kdf_params = KdfParams {
        memory_kib: u32_at(&params, 0),
        iterations: u32_at(&params, 4),
        parallelism: u32_at(&params, 8),
    };
    if u32_at(&params, 12) as usize != crypto::KEY_LEN || kdf_params.validate().is_err() {
        return Err(FormatError::InvalidField("argon2_params"));
    }

    Ok(UserRecord {
        user_id: fields.string(TLV_USER_ID, "user_id")?,
        salt: fields.fixed(TLV_KDF_SALT, "salt")?,
        token: VerificationToken::from_bytes(fields.fixed(TLV_VERIFIER, "verifier")?),
        kdf_params,
        created_at: u64::from_le_bytes(fields.fixed(TLV_CREATED_AT, "created_at")?),
        pending_keys: fields
            .all(TLV_PENDING_KEY)
            .map(decode_pending_key)
            .collect::<Result<_, _>>()?,
    })
}

fn decode_pending_key(value: &[u8]) -> Result<Envelope, FormatError> {
    if value.len() != PENDING_KEY_LEN {
        return Err(FormatError::InvalidField("pending_key"));
    }
    let (nonce, rest) = value.split_at(XCHACHA_NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);
    Ok(Envelope {
        nonce: nonce
            .try_into()
            .map_err(|_| FormatError::InvalidField("pending_key"))?,
        ciphertext: ciphertext.to_vec(),
        tag: tag
            .try_into()
            .map_err(|_| FormatError::InvalidField("pending_key"))?,
    })
}

pub fn encode_entry_record(record: &EntryRecord) -> Vec<u8> {
    let mut tlvs = Vec::with_capacity(128 + record.envelope.ciphertext.len());
    push_tlv(&mut tlvs, TLV_USER_ID, record.user_id.as_bytes());
    push_tlv(&mut tlvs, TLV_ENTRY_ID, record.entry_id.as_bytes());
    push_tlv(&mut tlvs, TLV_AEAD_ALG, AEAD_ALG_XCHACHA20POLY1305);
    push_tlv(&mut tlvs, TLV_NONCE, &record.envelope.nonce);
    push_tlv(&mut tlvs, TLV_CIPHERTEXT, &record.envelope.ciphertext);
    push_tlv(&mut tlvs, TLV_TAG, &record.envelope.tag);
    push_tlv(&mut tlvs, TLV_CREATED_AT, &record.created_at.to_le_bytes());
    push_tlv(&mut tlvs, TLV_MODIFIED_AT, &record.modified_at.to_le_bytes());

    frame(ENTRY_MAGIC, &tlvs)
}

pub fn decode_entry_record(bytes: &[u8]) -> Result<EntryRecord, FormatError> {
    let fields = parse(ENTRY_MAGIC, bytes)?;

    if fields.require(TLV_AEAD_ALG, "aead_alg")? != AEAD_ALG_XCHACHA20POLY1305 {
        return Err(FormatError::InvalidField("aead_alg"));
    }

    let nonce: [u8; XCHACHA_NONCE_LEN] = fields.fixed(TLV_NONCE, "nonce")?;
    let tag: [u8; TAG_LEN] = fields.fixed(TLV_TAG, "tag")?;
    Ok(EntryRecord {
        user_id: fields.string(TLV_USER_ID, "user_id")?,
        entry_id: fields.string(TLV_ENTRY_ID, "entry_id")?,
        envelope: Envelope {
            nonce,
            ciphertext: fields.require(TLV_CIPHERTEXT, "ciphertext")?.to_vec(),
            tag,
        },
        created_at: u64::from_le_bytes(fields.fixed(TLV_CREATED_AT, "created_at")?),
        modified_at: u64::from_le_bytes(fields.fixed(TLV_MODIFIED_AT, "modified_at")?),
    })
}

fn frame(magic: &[u8; 8], tlvs: &[u8]) -> Vec<u8> {
    let total_len = (FIXED_HEADER_LEN + tlvs.len()) as u32;

    let mut out = Vec::with_capacity(total_len as usize);
    out.extend_from_slice(magic);
    out.extend_from_slice(&VERSION_V1.to_le_bytes());
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(tlvs);
    out
}

fn push_tlv(buf: &mut Vec<u8>, typ: u16, value: &[u8]) {
    buf.extend_from_slice(&typ.to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
}

struct Fields<'a> {
    items: Vec<(u16, &'a [u8])>,
}

impl<'a> Fields<'a> {
    fn require(&self, typ: u16, name: &'static str) -> Result<&'a [u8], FormatError> {
        self.items
            .iter()
            .find(|(t, _)| *t == typ)
            .map(|(_, value)| *value)
            .ok_or(FormatError::MissingField(name))
    }

    fn all(&self, typ: u16) -> impl Iterator<Item = &'a [u8]> {
        self.items
            .iter()
            .filter(move |(t, _)| *t == typ)
            .map(|(_, value)| *value)
    }

    fn fixed<const N: usize>(&self, typ: u16, name: &'static str) -> Result<[u8; N], FormatError> {
        self.require(typ, name)?
            .try_into()
            .map_err(|_| FormatError::InvalidField(name))
    }

    fn string(&self, typ: u16, name: &'static str) -> Result<String, FormatError> {
        let bytes = self.require(typ, name)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidField(name))
    }
}

fn parse<'a>(magic: &[u8; 8], bytes: &'a [u8]) -> Result<Fields<'a>, FormatError> {
    if bytes.len() < FIXED_HEADER_LEN {
        return Err(FormatError::TooSmall);
    }

    if &bytes[0..8] != magic {
        return Err(FormatError::InvalidMagic);
    }

    let version = u16::from_le_bytes([bytes[8], bytes[9]]);
    if version != VERSION_V1 {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let total_len = u32_at(bytes, 10) as usize;
    if total_len != bytes.len() {
        return Err(FormatError::InvalidLength);
    }

    let mut items = Vec::new();
    let mut rest = &bytes[FIXED_HEADER_LEN..];
    while !rest.is_empty() {
        if rest.len() < 6 {
            return Err(FormatError::Truncated);
        }
        let typ = u16::from_le_bytes([rest[0], rest[1]]);
        let len = u32_at(rest, 2) as usize;
        let end = len.checked_add(6).ok_or(FormatError::Truncated)?;
        let value = rest.get(6..end).ok_or(FormatError::Truncated)?;
        items.push((typ, value));
        rest = &rest[end..];
    }
    Ok(Fields { items })
}

/// Reads a little-endian `u32`; callers guarantee `offset + 4 <= bytes.len()`.
fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
