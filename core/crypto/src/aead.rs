//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce. Callers supply the nonce and associated data;
//! the stream layer derives both from its header and chunk position.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    XChaCha20Poly1305,
};

use crate::keys::CipherKey;
use chap_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Seal one chunk.
///
/// # Postconditions
/// - Returns ciphertext || tag, `plaintext.len() + TAG_SIZE` bytes
///
/// # Security
/// - Caller is responsible for nonce uniqueness under `key`
pub fn seal_chunk(
    key: &CipherKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    cipher
        .encrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))
}

/// Open one chunk sealed by [`seal_chunk`].
///
/// # Errors
/// - `Authentication` if the chunk is shorter than a tag, or if the key,
///   nonce, associated data, or ciphertext do not match
pub fn open_chunk(
    key: &CipherKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    sealed: &[u8],
) -> Result<Vec<u8>> {
    if sealed.len() < TAG_SIZE {
        return Err(Error::Authentication("Chunk too short".to_string()));
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload { msg: sealed, aad },
        )
        .map_err(|_| {
            Error::Authentication("invalid key, corrupted data, or reordered chunk".to_string())
        })
}
