//! Encrypted request bodies for the MinIO admin API.
//!
//! Layout: `salt(32) || algorithm id(1) || nonce(8) || stream`, where the
//! key is Argon2id(admin secret, salt) and the stream is a sequence of
//! AES-256-GCM sealed fragments of at most 16 KiB plaintext each. Fragment
//! `n` (1-based) uses nonce `nonce || le32(n)` and associated data
//! `flag || tag0`, with `flag` 0x80 on the last fragment and `tag0` the GCM
//! tag of an empty message under sequence number 0.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{RngCore, rngs::OsRng};

pub(crate) const SALT_LEN: usize = 32;
pub(crate) const NONCE_PREFIX_LEN: usize = 8;
pub(crate) const FRAGMENT_LEN: usize = 16 * 1024;
const TAG_LEN: usize = 16;

/// Argon2id with AES-256-GCM.
pub(crate) const ARGON2ID_AES_GCM: u8 = 0x00;

const ARGON2_TIME: u32 = 1;
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_LANES: u32 = 4;

const FINAL_FLAG: u8 = 0x80;

/// Seal `plaintext` with a key derived from `password`.
pub fn seal(password: &str, plaintext: &[u8]) -> Result<Vec<u8>, String> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_PREFIX_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .and_then(|_| OsRng.try_fill_bytes(&mut nonce))
        .map_err(|err| format!("randomness unavailable: {}", err))?;
    seal_with(password, plaintext, &salt, &nonce)
}

pub(crate) fn seal_with(
    password: &str,
    plaintext: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_PREFIX_LEN],
) -> Result<Vec<u8>, String> {
    let cipher = stream_cipher(password, salt)?;

    let fragments = plaintext.len().div_ceil(FRAGMENT_LEN).max(1);
    let mut out =
        Vec::with_capacity(SALT_LEN + 1 + NONCE_PREFIX_LEN + plaintext.len() + fragments * TAG_LEN);
    out.extend_from_slice(salt);
    out.push(ARGON2ID_AES_GCM);
    out.extend_from_slice(nonce);

    let mut aad = [0u8; 1 + TAG_LEN];
    let tag0 = cipher
        .encrypt(&fragment_nonce(nonce, 0), Payload { msg: &[], aad: &[] })
        .map_err(|_| "sealing associated data failed".to_string())?;
    aad[1..].copy_from_slice(&tag0);

    for index in 0..fragments {
        let start = index * FRAGMENT_LEN;
        let end = (start + FRAGMENT_LEN).min(plaintext.len());
        if index + 1 == fragments {
            aad[0] = FINAL_FLAG;
        }
        let sealed = cipher
            .encrypt(
                &fragment_nonce(nonce, index as u32 + 1),
                Payload {
                    msg: &plaintext[start..end],
                    aad: &aad,
                },
            )
            .map_err(|_| format!("sealing fragment {} failed", index))?;
        out.extend_from_slice(&sealed);
    }

    Ok(out)
}

pub(crate) fn stream_cipher(password: &str, salt: &[u8]) -> Result<Aes256Gcm, String> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_TIME, ARGON2_LANES, Some(32))
        .map_err(|err| err.to_string())?;
    let mut key = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|err| err.to_string())?;
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)))
}

pub(crate) fn fragment_nonce(prefix: &[u8; NONCE_PREFIX_LEN], seq: u32) -> Nonce<aes_gcm::aead::consts::U12> {
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..].copy_from_slice(&seq.to_le_bytes());
    *Nonce::from_slice(&nonce)
}
