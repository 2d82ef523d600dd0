//! Cryptographic primitives for chap.
//!
//! This module provides:
//! - Secret-to-key extension for caller-supplied secrets
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Key types with automatic zeroization
//! - Chunked streaming encryption for unbounded input
//!
//! # Security Guarantees
//! - All key material is zeroized on drop
//! - No plaintext or key material is ever logged
//!
//! Zeroization is best effort. It cannot reach copies made by the
//! allocator, the compiler, or pages the OS swapped out.

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod stream;
pub mod zeroizer;

pub use aead::{open_chunk, seal_chunk};
pub use kdf::{derive_key, extend_secret};
pub use keys::{CipherKey, KEY_LENGTH};
pub use stream::{
    open_bytes, open_stream, seal_bytes, seal_stream, CipherContext, OpeningStream,
    SealingStream, DEFAULT_CHUNK_SIZE,
};
pub use zeroizer::zeroize_buffer;
