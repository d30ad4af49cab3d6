//! AES-256-GCM sealing of whole store blobs.
//!
//! Layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`. A fresh random
//! nonce is generated per call so identical plaintexts never produce
//! identical blobs.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};

use crate::{error::StoreError, key::DerivedKey};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<Vec<u8>, StoreError> {
    let cipher = build_cipher(key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| StoreError::Encrypt(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn decrypt(blob: &[u8], key: &DerivedKey) -> Result<Vec<u8>, StoreError> {
    if blob.len() < NONCE_LEN {
        return Err(StoreError::CiphertextTooShort);
    }
    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    build_cipher(key)
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| StoreError::AuthenticationFailed)
}

fn build_cipher(key: &DerivedKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}
