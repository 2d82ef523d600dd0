//! Streaming encryption for unbounded input.
//!
//! Input is split into fixed-size chunks that are sealed independently,
//! so memory use is bounded by the chunk size rather than the stream
//! length. Output is written as soon as each chunk is processed; a failure
//! part way through leaves the chunks already written in place.
//!
//! # Format
//! ```text
//! header  = version (1) || chunk_size (4, LE) || nonce_prefix (16)
//! chunk_i = XChaCha20-Poly1305(nonce_prefix || i (8, BE), header || last_flag)
//! stream  = header || chunk_0 || ... || chunk_n
//! ```
//! Every chunk but the last holds exactly `chunk_size` plaintext bytes.
//! The last chunk holds `0..=chunk_size` bytes and is sealed with
//! `last_flag = 1`, so truncating the stream at a chunk boundary or
//! appending data to it fails authentication.

use std::io::{self, Read, Write};

use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::aead::{open_chunk, seal_chunk, NONCE_SIZE, TAG_SIZE};
use crate::keys::CipherKey;
use crate::zeroizer::zeroize_buffer;
use chap_common::{Error, Result};

/// Default plaintext chunk size (1 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest chunk size accepted when sealing or found in a stream header.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Stream format version.
pub const STREAM_VERSION: u8 = 1;

/// Random bytes shared by every chunk nonce of one stream.
pub const NONCE_PREFIX_SIZE: usize = 16;

/// Header size: version (1) + chunk_size (4) + nonce_prefix (16).
pub const HEADER_SIZE: usize = 1 + 4 + NONCE_PREFIX_SIZE;

/// Per-stream parameters written ahead of the first chunk.
struct StreamHeader {
    chunk_size: u32,
    nonce_prefix: [u8; NONCE_PREFIX_SIZE],
}

impl StreamHeader {
    /// Fresh header with a random nonce prefix.
    fn generate(chunk_size: u32) -> Self {
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_prefix);
        Self {
            chunk_size,
            nonce_prefix,
        }
    }

    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = STREAM_VERSION;
        bytes[1..5].copy_from_slice(&self.chunk_size.to_le_bytes());
        bytes[5..].copy_from_slice(&self.nonce_prefix);
        bytes
    }

    /// Parse a header read from a sealed stream.
    ///
    /// Anything this module would not have written is reported as an
    /// authentication failure.
    fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        if bytes[0] != STREAM_VERSION {
            return Err(Error::Authentication(format!(
                "Unsupported stream version: {}",
                bytes[0]
            )));
        }

        let mut size_bytes = [0u8; 4];
        size_bytes.copy_from_slice(&bytes[1..5]);
        let chunk_size = u32::from_le_bytes(size_bytes);
        if chunk_size == 0 || chunk_size as usize > MAX_CHUNK_SIZE {
            return Err(Error::Authentication(format!(
                "Invalid chunk size in header: {}",
                chunk_size
            )));
        }

        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        nonce_prefix.copy_from_slice(&bytes[5..]);

        Ok(Self {
            chunk_size,
            nonce_prefix,
        })
    }

    /// Nonce for chunk `index`.
    fn nonce(&self, index: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..NONCE_PREFIX_SIZE].copy_from_slice(&self.nonce_prefix);
        nonce[NONCE_PREFIX_SIZE..].copy_from_slice(&index.to_be_bytes());
        nonce
    }
}

/// Associated data for a chunk: the full header plus the last-chunk flag.
fn chunk_aad(header: &[u8; HEADER_SIZE], last: bool) -> [u8; HEADER_SIZE + 1] {
    let mut aad = [0u8; HEADER_SIZE + 1];
    aad[..HEADER_SIZE].copy_from_slice(header);
    aad[HEADER_SIZE] = u8::from(last);
    aad
}

fn validate_chunk_size(chunk_size: usize) -> Result<u32> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(Error::InvalidInput(format!(
            "Chunk size must be between 1 and {} bytes, got {}",
            MAX_CHUNK_SIZE, chunk_size
        )));
    }
    Ok(chunk_size as u32)
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
///
/// Returns the number of bytes read; less than `buf.len()` means EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Sealing side of the stream cipher.
pub struct SealingStream<'a> {
    key: &'a CipherKey,
    chunk_size: usize,
}

impl<'a> SealingStream<'a> {
    /// Create a sealing stream with the default chunk size.
    pub fn new(key: &'a CipherKey) -> Self {
        Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Seal everything from `reader` into `writer`.
    ///
    /// # Postconditions
    /// - Returns the number of plaintext bytes consumed
    /// - At most two chunks of plaintext are held in memory
    ///
    /// # Errors
    /// - `InvalidInput` if the chunk size is zero or above MAX_CHUNK_SIZE
    /// - `Io` on any read or write failure; nothing is rolled back
    pub fn seal<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let header = StreamHeader::generate(validate_chunk_size(self.chunk_size)?);
        let header_bytes = header.to_bytes();
        writer.write_all(&header_bytes)?;

        let mut current = Zeroizing::new(vec![0u8; self.chunk_size]);
        let mut next = Zeroizing::new(vec![0u8; self.chunk_size]);
        let mut filled = read_full(&mut reader, &mut current)?;
        let mut index = 0u64;
        let mut total = 0u64;

        loop {
            // A full chunk is the last one only if nothing follows it.
            let lookahead = if filled == self.chunk_size {
                read_full(&mut reader, &mut next)?
            } else {
                0
            };
            let last = lookahead == 0;

            let sealed = seal_chunk(
                self.key,
                &header.nonce(index),
                &chunk_aad(&header_bytes, last),
                &current[..filled],
            )?;
            writer.write_all(&sealed)?;
            total += filled as u64;

            if last {
                break;
            }
            std::mem::swap(&mut current, &mut next);
            // Sealed plaintext is not kept while the next lookahead is read.
            zeroize_buffer(Some(&mut next[..]));
            filled = lookahead;
            index += 1;
        }

        writer.flush()?;
        debug!(chunks = index + 1, bytes = total, "Sealed stream");
        Ok(total)
    }
}

/// Opening side of the stream cipher.
pub struct OpeningStream<'a> {
    key: &'a CipherKey,
    expected_chunk_size: Option<usize>,
}

impl<'a> OpeningStream<'a> {
    /// Create an opening stream that accepts any chunk size in the header.
    pub fn new(key: &'a CipherKey) -> Self {
        Self {
            key,
            expected_chunk_size: None,
        }
    }

    /// Require the stream to have been sealed with `size`-byte chunks.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.expected_chunk_size = Some(size);
        self
    }

    /// Open a sealed stream from `reader` into `writer`.
    ///
    /// # Postconditions
    /// - Returns the number of plaintext bytes written
    /// - Only authenticated plaintext is written; the chunk that fails and
    ///   everything after it are never emitted
    ///
    /// # Errors
    /// - `InvalidInput` if the expected chunk size is out of range
    /// - `Authentication` for a malformed header, a chunk size other than
    ///   the expected one, tampering, truncation, or a wrong key
    /// - `Io` on any read or write failure
    pub fn open<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        if let Some(expected) = self.expected_chunk_size {
            validate_chunk_size(expected)?;
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        if read_full(&mut reader, &mut header_bytes)? < HEADER_SIZE {
            return Err(Error::Authentication("Truncated stream header".to_string()));
        }
        let header = StreamHeader::parse(&header_bytes)?;
        let chunk_size = header.chunk_size as usize;
        if let Some(expected) = self.expected_chunk_size {
            if expected != chunk_size {
                return Err(Error::Authentication(format!(
                    "Stream chunk size {} does not match expected {}",
                    chunk_size, expected
                )));
            }
        }

        let sealed_size = chunk_size + TAG_SIZE;
        // One byte past a full sealed chunk shows whether another follows.
        let mut buffer = vec![0u8; sealed_size + 1];
        let mut filled = read_full(&mut reader, &mut buffer)?;
        let mut index = 0u64;
        let mut total = 0u64;

        loop {
            let last = filled <= sealed_size;
            let len = if last { filled } else { sealed_size };

            let plaintext = Zeroizing::new(open_chunk(
                self.key,
                &header.nonce(index),
                &chunk_aad(&header_bytes, last),
                &buffer[..len],
            )?);
            writer.write_all(&plaintext)?;
            total += plaintext.len() as u64;

            if last {
                break;
            }
            buffer[0] = buffer[sealed_size];
            filled = 1 + read_full(&mut reader, &mut buffer[1..])?;
            index += 1;
        }

        writer.flush()?;
        debug!(chunks = index + 1, bytes = total, "Opened stream");
        Ok(total)
    }
}

/// Seal `reader` into `writer` in `chunk_size`-byte chunks.
pub fn seal_stream<R: Read, W: Write>(
    key: &CipherKey,
    reader: R,
    writer: W,
    chunk_size: usize,
) -> Result<u64> {
    SealingStream::new(key)
        .with_chunk_size(chunk_size)
        .seal(reader, writer)
}

/// Open a stream sealed by [`seal_stream`] with the same `chunk_size`.
pub fn open_stream<R: Read, W: Write>(
    key: &CipherKey,
    reader: R,
    writer: W,
    chunk_size: usize,
) -> Result<u64> {
    OpeningStream::new(key)
        .with_chunk_size(chunk_size)
        .open(reader, writer)
}

/// Seal a complete byte slice with the default chunk size.
///
/// This is a convenience function for when the complete data is available.
pub fn seal_bytes(key: &CipherKey, data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    SealingStream::new(key).seal(data, &mut output)?;
    Ok(output)
}

/// Open a complete sealed byte slice, whatever chunk size it was sealed with.
pub fn open_bytes(key: &CipherKey, data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    OpeningStream::new(key).open(data, &mut output)?;
    Ok(output)
}

/// Cipher context owning the key for a single invocation.
///
/// The key is zeroized when the context is dropped.
#[derive(Debug)]
pub struct CipherContext {
    key: CipherKey,
}

impl CipherContext {
    /// Take ownership of `key`.
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    /// See [`seal_stream`].
    pub fn seal_stream<R: Read, W: Write>(
        &self,
        reader: R,
        writer: W,
        chunk_size: usize,
    ) -> Result<u64> {
        seal_stream(&self.key, reader, writer, chunk_size)
    }

    /// See [`open_stream`].
    pub fn open_stream<R: Read, W: Write>(
        &self,
        reader: R,
        writer: W,
        chunk_size: usize,
    ) -> Result<u64> {
        open_stream(&self.key, reader, writer, chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;
    use proptest::prelude::*;

    fn key(byte: u8) -> CipherKey {
        CipherKey::from_bytes([byte; KEY_LENGTH])
    }

    fn seal_with(key: &CipherKey, data: &[u8], chunk_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        seal_stream(key, data, &mut out, chunk_size).unwrap();
        out
    }

    fn open_with(key: &CipherKey, data: &[u8], chunk_size: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        open_stream(key, data, &mut out, chunk_size)?;
        Ok(out)
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// Hands out at most one byte per read call.
    struct TrickleReader<'a>(&'a [u8]);

    impl Read for TrickleReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    /// Fails with `Interrupted` once, then delegates.
    struct InterruptOnce<R> {
        inner: R,
        interrupted: bool,
    }

    impl<R: Read> Read for InterruptOnce<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device unplugged"))
        }
    }

    /// Accepts `capacity` bytes, then fails every write.
    struct LimitedWriter {
        written: Vec<u8>,
        capacity: usize,
    }

    impl Write for LimitedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity - self.written.len();
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            let n = room.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_roundtrip_boundary_sizes() {
        let key = key(42);
        for len in [0, 1, 1023, 1024, 1025, 2048, 3 * 1024 + 7] {
            let plaintext = sample(len);
            let sealed = seal_with(&key, &plaintext, DEFAULT_CHUNK_SIZE);
            let opened = open_with(&key, &sealed, DEFAULT_CHUNK_SIZE).unwrap();
            assert_eq!(opened, plaintext, "length {}", len);
        }
    }

    #[test]
    fn test_stream_sealed_length() {
        let key = key(42);
        // 2 full chunks + 1 partial chunk
        let sealed = seal_with(&key, &sample(40), 16);
        assert_eq!(sealed.len(), HEADER_SIZE + 2 * (16 + TAG_SIZE) + (8 + TAG_SIZE));

        // Exact multiple: no trailing empty chunk
        let sealed = seal_with(&key, &sample(32), 16);
        assert_eq!(sealed.len(), HEADER_SIZE + 2 * (16 + TAG_SIZE));

        // Empty input still carries one authenticated chunk
        let sealed = seal_with(&key, b"", 16);
        assert_eq!(sealed.len(), HEADER_SIZE + TAG_SIZE);
    }

    #[test]
    fn test_stream_header_format() {
        let key = key(42);
        let sealed = seal_with(&key, b"Test", DEFAULT_CHUNK_SIZE);

        assert_eq!(sealed[0], STREAM_VERSION);
        let chunk_size = u32::from_le_bytes(sealed[1..5].try_into().unwrap());
        assert_eq!(chunk_size as usize, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_stream_fresh_nonce_prefix() {
        let key = key(42);
        let a = seal_with(&key, b"same input", 16);
        let b = seal_with(&key, b"same input", 16);
        assert_ne!(a[5..HEADER_SIZE], b[5..HEADER_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_stream_wrong_key_fails() {
        let sealed = seal_with(&key(1), b"Secret streaming data", 16);
        let err = open_with(&key(2), &sealed, 16).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_every_single_byte_flip_is_detected() {
        let key = key(42);
        let plaintext = sample(50);
        let sealed = seal_with(&key, &plaintext, 16);

        for pos in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[pos] ^= 0x01;
            let err = open_with(&key, &tampered, 16).unwrap_err();
            assert!(err.is_authentication(), "flip at {} gave {:?}", pos, err);
        }
    }

    #[test]
    fn test_truncation_at_chunk_boundary_fails() {
        let key = key(42);
        let sealed = seal_with(&key, &sample(48), 16);
        let cut = HEADER_SIZE + 2 * (16 + TAG_SIZE);

        let err = open_with(&key, &sealed[..cut], 16).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_truncated_header_fails() {
        let key = key(42);
        let sealed = seal_with(&key, b"data", 16);

        assert!(open_with(&key, &sealed[..HEADER_SIZE - 1], 16)
            .unwrap_err()
            .is_authentication());
        assert!(open_with(&key, b"", 16).unwrap_err().is_authentication());
    }

    #[test]
    fn test_appended_data_fails() {
        let key = key(42);
        let mut sealed = seal_with(&key, &sample(20), 16);
        sealed.push(0);

        assert!(open_with(&key, &sealed, 16).unwrap_err().is_authentication());
    }

    #[test]
    fn test_reordered_chunks_fail() {
        let key = key(42);
        let mut sealed = seal_with(&key, &sample(48), 16);
        let size = 16 + TAG_SIZE;
        let (first, second) = (HEADER_SIZE, HEADER_SIZE + size);
        let chunk0 = sealed[first..first + size].to_vec();
        let chunk1 = sealed[second..second + size].to_vec();
        sealed[first..first + size].copy_from_slice(&chunk1);
        sealed[second..second + size].copy_from_slice(&chunk0);

        assert!(open_with(&key, &sealed, 16).unwrap_err().is_authentication());
    }

    #[test]
    fn test_failure_stops_output_at_failing_chunk() {
        let key = key(42);
        let plaintext = sample(64);
        let mut sealed = seal_with(&key, &plaintext, 16);
        // Corrupt the third chunk
        sealed[HEADER_SIZE + 2 * (16 + TAG_SIZE) + 3] ^= 0x80;

        let mut out = Vec::new();
        let err = open_stream(&key, &sealed[..], &mut out, 16).unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(out, &plaintext[..32]);
    }

    #[test]
    fn test_chunk_size_mismatch_fails() {
        let key = key(42);
        let sealed = seal_with(&key, b"sealed with 16", 16);

        assert!(open_with(&key, &sealed, 32).unwrap_err().is_authentication());
        assert_eq!(open_bytes(&key, &sealed).unwrap(), b"sealed with 16");
    }

    #[test]
    fn test_invalid_chunk_size() {
        let key = key(42);
        let mut out = Vec::new();

        let err = seal_stream(&key, &b"x"[..], &mut out, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(out.is_empty());

        let err = seal_stream(&key, &b"x"[..], &mut out, MAX_CHUNK_SIZE + 1).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_short_reads_are_coalesced() {
        let key = key(42);
        let plaintext = sample(100);

        let mut sealed = Vec::new();
        seal_stream(&key, TrickleReader(&plaintext), &mut sealed, 16).unwrap();
        // Same framing as a bulk read: 6 full chunks + 4 bytes
        assert_eq!(sealed.len(), HEADER_SIZE + 6 * (16 + TAG_SIZE) + 4 + TAG_SIZE);

        let mut opened = Vec::new();
        open_stream(&key, TrickleReader(&sealed), &mut opened, 16).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let key = key(42);
        let reader = InterruptOnce {
            inner: &b"interrupted once"[..],
            interrupted: false,
        };
        let mut sealed = Vec::new();
        seal_stream(&key, reader, &mut sealed, 16).unwrap();
        assert_eq!(open_with(&key, &sealed, 16).unwrap(), b"interrupted once");
    }

    #[test]
    fn test_read_error_is_io() {
        let key = key(42);
        let err = seal_stream(&key, BrokenReader, Vec::new(), 16).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let err = open_stream(&key, BrokenReader, Vec::new(), 16).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_write_error_is_io() {
        let key = key(42);
        let mut writer = LimitedWriter {
            written: Vec::new(),
            capacity: HEADER_SIZE + 10,
        };
        let err = seal_stream(&key, &sample(64)[..], &mut writer, 16).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(writer.written.len(), HEADER_SIZE + 10);
    }

    #[test]
    fn test_cipher_context_roundtrip() {
        let context = CipherContext::new(key(7));
        let plaintext = sample(5000);

        let mut sealed = Vec::new();
        context
            .seal_stream(&plaintext[..], &mut sealed, DEFAULT_CHUNK_SIZE)
            .unwrap();
        let mut opened = Vec::new();
        let n = context
            .open_stream(&sealed[..], &mut opened, DEFAULT_CHUNK_SIZE)
            .unwrap();

        assert_eq!(n, 5000);
        assert_eq!(opened, plaintext);
        assert_eq!(format!("{:?}", context), "CipherContext { key: CipherKey([REDACTED]) }");
    }

    #[test]
    fn test_bytes_helpers_roundtrip() {
        let key = key(42);
        let sealed = seal_bytes(&key, b"Hello, streaming encryption!").unwrap();
        assert_eq!(open_bytes(&key, &sealed).unwrap(), b"Hello, streaming encryption!");
    }

    proptest! {
        #[test]
        fn roundtrip_any_input(
            data in proptest::collection::vec(any::<u8>(), 0..=600),
            chunk_size in 1usize..=64,
        ) {
            let key = key(9);
            let sealed = seal_with(&key, &data, chunk_size);
            let opened = open_with(&key, &sealed, chunk_size).unwrap();
            prop_assert_eq!(opened, data);
        }

        #[test]
        fn any_flip_is_rejected(
            data in proptest::collection::vec(any::<u8>(), 0..=200),
            pos in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let key = key(9);
            let mut sealed = seal_with(&key, &data, 32);
            let i = pos.index(sealed.len());
            sealed[i] ^= mask;
            let err = open_with(&key, &sealed, 32).unwrap_err();
            prop_assert!(err.is_authentication());
        }
    }
}
