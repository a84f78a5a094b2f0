// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The binary record format: a fixed 16-byte header followed by the key and value bytes.
//!
//! ```text
//! magic (4B BE) | key_len (4B BE) | value_len (8B BE) | key | value
//! ```
//!
//! A record whose `value_len` is zero is a tombstone.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Marks the start of a record. Chosen arbitrarily, but fixed for this format.
pub const MAGIC: u32 = 0x00C0_FF33;

/// Size in bytes of the fixed record header.
pub const HEADER_LEN: u64 = 16;

/// Error while writing a record.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Error while reading a record.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// The magic at the start of a record did not match [`MAGIC`]
    BadMagic,

    /// A record header was read but the stream ended before the full frame did
    TruncatedFrame,

    /// The stream ended exactly on a frame boundary; not an error, but distinct from I/O failure
    EndOfStream,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::BadMagic => write!(f, "invalid record magic"),
            Self::TruncatedFrame => write!(f, "truncated record at end of segment"),
            Self::EndOfStream => write!(f, "end of stream"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::BadMagic | Self::TruncatedFrame | Self::EndOfStream => None,
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Writes a single record: `magic || key_len || value_len || key || value`.
///
/// Flushes the writer before returning so the caller can trust the returned byte count.
///
/// # Errors
///
/// Returns `Err` if the underlying writer fails.
pub fn encode<W: Write>(writer: &mut W, key: &[u8], value: &[u8]) -> Result<u64, EncodeError> {
    writer.write_u32::<BigEndian>(MAGIC)?;

    // NOTE: Truncation is intentional; the format bounds keys to 2^32 and values to 2^64
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u32::<BigEndian>(key.len() as u32)?;
    writer.write_u64::<BigEndian>(value.len() as u64)?;

    writer.write_all(key)?;
    writer.write_all(value)?;
    writer.flush()?;

    Ok(HEADER_LEN + key.len() as u64 + value.len() as u64)
}

/// Reads the next record from `reader`.
///
/// Returns `(key, value, bytes_consumed)`. A clean end of stream (no bytes read at all for the
/// header) is reported as [`DecodeError::EndOfStream`]; a header that starts reading but cannot
/// be completed is [`DecodeError::TruncatedFrame`].
///
/// # Errors
///
/// Returns `Err` if the magic is invalid, the frame is truncated, or the underlying reader fails.
pub fn decode_next<R: Read>(reader: &mut R) -> Result<(Vec<u8>, Vec<u8>, u64), DecodeError> {
    let mut magic_buf = [0_u8; 4];

    if !read_fully_or_none(reader, &mut magic_buf)? {
        return Err(DecodeError::EndOfStream);
    }

    let magic = u32::from_be_bytes(magic_buf);
    if magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    let key_len = reader
        .read_u32::<BigEndian>()
        .map_err(|_| DecodeError::TruncatedFrame)?;
    let value_len = reader
        .read_u64::<BigEndian>()
        .map_err(|_| DecodeError::TruncatedFrame)?;

    let mut key = vec![0_u8; key_len as usize];
    reader
        .read_exact(&mut key)
        .map_err(|_| DecodeError::TruncatedFrame)?;

    let mut value = vec![0_u8; value_len as usize];
    reader
        .read_exact(&mut value)
        .map_err(|_| DecodeError::TruncatedFrame)?;

    let bytes_consumed = HEADER_LEN + key_len as u64 + value_len as u64;
    Ok((key, value, bytes_consumed))
}

/// Decodes a single record from an in-memory slice at `offset`, given the total frame length.
///
/// # Errors
///
/// Returns `Err` if the magic is invalid or the slice is shorter than `length` bytes.
pub fn decode_at(bytes: &[u8], offset: u64, length: u64) -> Result<(Vec<u8>, Vec<u8>), DecodeError> {
    let start = offset as usize;
    let end = start
        .checked_add(length as usize)
        .ok_or(DecodeError::TruncatedFrame)?;
    let frame = bytes.get(start..end).ok_or(DecodeError::TruncatedFrame)?;

    let mut cursor = frame;
    let (key, value, _) = decode_next(&mut cursor)?;
    Ok((key, value))
}

/// Reads `buf.len()` bytes, but distinguishes "stream ended before any byte was read" (returns
/// `Ok(false)`) from a genuine I/O error or a partial read (bubbled up / `TruncatedFrame`).
fn read_fully_or_none<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, DecodeError> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => {
                return if read == 0 {
                    Ok(false)
                } else {
                    Err(DecodeError::TruncatedFrame)
                }
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecodeError::Io(e)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    #[allow(clippy::expect_used)]
    fn round_trip() {
        let mut buf = Vec::new();
        let written = encode(&mut buf, b"hello", b"world").expect("encode");
        assert_eq!(written, HEADER_LEN + 5 + 5);

        let mut cursor = buf.as_slice();
        let (key, value, consumed) = decode_next(&mut cursor).expect("decode");
        assert_eq!(key, b"hello");
        assert_eq!(value, b"world");
        assert_eq!(consumed, written);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn round_trip_empty_key() {
        let mut buf = Vec::new();
        encode(&mut buf, b"", b"value").expect("encode");

        let mut cursor = buf.as_slice();
        let (key, value, _) = decode_next(&mut cursor).expect("decode");
        assert!(key.is_empty());
        assert_eq!(value, b"value");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn tombstone_is_zero_length_value() {
        let mut buf = Vec::new();
        encode(&mut buf, b"key", b"").expect("encode");

        let mut cursor = buf.as_slice();
        let (_, value, _) = decode_next(&mut cursor).expect("decode");
        assert!(value.is_empty());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        encode(&mut buf, b"key", b"value").expect("encode");

        // flip a byte inside the magic field
        if let Some(byte) = buf.first_mut() {
            *byte ^= 0xFF;
        }

        let mut cursor = buf.as_slice();
        assert!(matches!(decode_next(&mut cursor), Err(DecodeError::BadMagic)));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn truncated_frame_is_reported() {
        let mut buf = Vec::new();
        encode(&mut buf, b"key", b"value").expect("encode");
        buf.truncate(buf.len() - 2);

        let mut cursor = buf.as_slice();
        assert!(matches!(
            decode_next(&mut cursor),
            Err(DecodeError::TruncatedFrame)
        ));
    }

    #[test]
    fn clean_end_of_stream() {
        let buf: Vec<u8> = Vec::new();
        let mut cursor = buf.as_slice();
        assert!(matches!(
            decode_next(&mut cursor),
            Err(DecodeError::EndOfStream)
        ));
    }
}
