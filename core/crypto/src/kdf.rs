//! Secret-to-key extension.
//!
//! Secrets shorter than the key length are padded with bytes taken from
//! the tail of a fixed run of the Fibonacci sequence (reduced mod 256).
//! Secrets longer than the key length are rejected, never truncated.
//!
//! # Security
//! This is NOT a key derivation function. The padding depends only on how
//! many bytes are missing, so two secrets of the same length share their
//! padding byte for byte. There is no salt and no work factor; a short
//! secret yields a weak key. The scheme is kept so that keys derived by
//! earlier releases stay the same.

use tracing::debug;
use zeroize::Zeroizing;

use crate::keys::{CipherKey, KEY_LENGTH};
use chap_common::{Error, Result};

/// Number of Fibonacci terms generated for padding.
pub const EXTENSION_RUN: usize = 10_000;

/// First `n` terms of s[0]=1, s[1]=1, s[k]=s[k-1]+s[k-2], each mod 256.
///
/// Only the low byte of each term is ever used, and addition mod 256 is
/// compatible with the full-width sum, so wrapping u8 arithmetic gives the
/// exact residues.
fn extension_sequence(n: usize) -> Vec<u8> {
    let mut seq: Vec<u8> = Vec::with_capacity(n);
    for i in 0..n {
        let term = if i < 2 {
            1
        } else {
            seq[i - 1].wrapping_add(seq[i - 2])
        };
        seq.push(term);
    }
    seq
}

/// Padding bytes for a secret that is `missing` bytes short, or `None` if
/// the run is too short to supply them.
fn padding(missing: usize) -> Option<Vec<u8>> {
    if missing > EXTENSION_RUN {
        return None;
    }
    let seq = extension_sequence(EXTENSION_RUN);
    Some(seq[EXTENSION_RUN - missing..].to_vec())
}

/// Bring `secret` to exactly `required_length` bytes.
///
/// # Postconditions
/// - The returned buffer is exactly `required_length` bytes
/// - It starts with `secret` unchanged
/// - It is zeroized when dropped
///
/// # Errors
/// - `MissingSecret` if `secret` is empty
/// - `InvalidKeyLength` if `secret` is longer than `required_length`, or
///   cannot be extended to it
pub fn extend_secret(secret: &[u8], required_length: usize) -> Result<Zeroizing<Vec<u8>>> {
    if secret.is_empty() {
        return Err(Error::MissingSecret);
    }

    let mut key = Zeroizing::new(Vec::with_capacity(required_length));
    key.extend_from_slice(secret);

    if secret.len() < required_length {
        let missing = required_length - secret.len();
        debug!(missing, "Extending short secret");
        let pad = padding(missing).ok_or(Error::InvalidKeyLength {
            expected: required_length,
            actual: secret.len(),
        })?;
        key.extend_from_slice(&pad);
    }

    if key.len() != required_length {
        return Err(Error::InvalidKeyLength {
            expected: required_length,
            actual: key.len(),
        });
    }

    Ok(key)
}

/// Derive a cipher key from a caller-supplied secret.
///
/// # Errors
/// - See [`extend_secret`]
pub fn derive_key(secret: &[u8]) -> Result<CipherKey> {
    let extended = extend_secret(secret, KEY_LENGTH)?;
    CipherKey::from_slice(&extended)
}
