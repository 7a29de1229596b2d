//! Big-endian binary primitives shared by the row codec, the tokenizer,
//! SSTables, and the WAL.
//!
//! Everything in this module is big-endian. The *other* binary primitive
//! layer in this crate, [`crate::encoding`], is native-endian and is used
//! only by the host-local `schema.bin`/`metadata.bin`/`manifest.bin`
//! files — see that module's docs for why the split exists.
//!
//! The functions here operate directly on `Vec<u8>` (append) and
//! `(&[u8], &mut usize)` (cursor read) rather than through a trait, since
//! callers typically interleave primitive and domain-specific fields
//! (null markers, variant tags) in one buffer and a free-function style
//! reads more directly than a generic `Decode` would for that pattern.
//!
//! # CRC32
//!
//! [`crc32`] computes the reflected CRC32 (polynomial `0xEDB88320`,
//! initial value `0xFFFFFFFF`, final XOR `0xFFFFFFFF`) via
//! [`crc32fast`], which implements exactly this variant (the one used by
//! zlib, gzip, and PNG).


use thiserror::Error;

/// Errors raised while decoding a big-endian-encoded byte buffer.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining from the cursor.
        available: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid UTF-8 in length-prefixed string")]
    InvalidUtf8,
}

#[inline]
fn require(buf: &[u8], offset: usize, needed: usize) -> Result<(), CodecError> {
    let available = buf.len().saturating_sub(offset);
    if available < needed {
        Err(CodecError::UnexpectedEof { needed, available })
    } else {
        Ok(())
    }
}

/// Appends an unsigned 32-bit integer in big-endian order.
pub fn put_u32_be(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Appends an unsigned 64-bit integer in big-endian order.
pub fn put_u64_be(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Appends a signed 32-bit integer in big-endian, two's-complement order.
pub fn put_i32_be(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Appends a signed 64-bit integer in big-endian, two's-complement order.
pub fn put_i64_be(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Appends `bytes` as `u32 length || bytes`, both big-endian.
pub fn put_bytes_be(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32_be(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

/// Appends `s` as `u32 length || utf8`, length big-endian.
pub fn put_str_be(out: &mut Vec<u8>, s: &str) {
    put_bytes_be(out, s.as_bytes());
}

/// Reads a big-endian `u32` at `buf[*offset..]`, advancing `offset`.
pub fn get_u32_be(buf: &[u8], offset: &mut usize) -> Result<u32, CodecError> {
    require(buf, *offset, 4)?;
    let v = u32::from_be_bytes(buf[*offset..*offset + 4].try_into().expect("checked above"));
    *offset += 4;
    Ok(v)
}

/// Reads a big-endian `u64` at `buf[*offset..]`, advancing `offset`.
pub fn get_u64_be(buf: &[u8], offset: &mut usize) -> Result<u64, CodecError> {
    require(buf, *offset, 8)?;
    let v = u64::from_be_bytes(buf[*offset..*offset + 8].try_into().expect("checked above"));
    *offset += 8;
    Ok(v)
}

/// Reads a big-endian, two's-complement `i32` at `buf[*offset..]`.
pub fn get_i32_be(buf: &[u8], offset: &mut usize) -> Result<i32, CodecError> {
    Ok(get_u32_be(buf, offset)? as i32)
}

/// Reads a big-endian, two's-complement `i64` at `buf[*offset..]`.
pub fn get_i64_be(buf: &[u8], offset: &mut usize) -> Result<i64, CodecError> {
    Ok(get_u64_be(buf, offset)? as i64)
}

/// Reads `u32 length || bytes`, returning a copy of `bytes`.
pub fn get_bytes_be(buf: &[u8], offset: &mut usize) -> Result<Vec<u8>, CodecError> {
    let len = get_u32_be(buf, offset)? as usize;
    require(buf, *offset, len)?;
    let v = buf[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(v)
}

/// Reads `u32 length || bytes` without copying, returning a borrowed slice.
pub fn get_bytes_be_ref<'a>(buf: &'a [u8], offset: &mut usize) -> Result<&'a [u8], CodecError> {
    let len = get_u32_be(buf, offset)? as usize;
    require(buf, *offset, len)?;
    let v = &buf[*offset..*offset + len];
    *offset += len;
    Ok(v)
}

/// Reads `u32 length || utf8`.
pub fn get_str_be(buf: &[u8], offset: &mut usize) -> Result<String, CodecError> {
    let raw = get_bytes_be(buf, offset)?;
    String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
}

/// Advances `offset` past `len` bytes without copying them, failing if
/// the buffer is too short. Used to skip over a value whose width is
/// already known to the caller (fixed-width scalar columns).
pub fn skip(buf: &[u8], offset: &mut usize, len: usize) -> Result<(), CodecError> {
    require(buf, *offset, len)?;
    *offset += len;
    Ok(())
}

/// Computes the reflected CRC32 (polynomial `0xEDB88320`) over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// A 7-ASCII-byte magic string followed by one `0x00` pad byte, as used
/// by every on-disk header in this crate (`BZST001`, `BZWAL002`, …).
pub fn put_magic(out: &mut Vec<u8>, magic: &[u8; 7]) {
    out.extend_from_slice(magic);
    out.push(0);
}

/// Reads and compares an 8-byte magic (7 ASCII bytes + one pad byte)
/// against `expected`, returning `true` on an exact match.
pub fn check_magic(buf: &[u8], offset: &mut usize, expected: &[u8; 7]) -> Result<bool, CodecError> {
    require(buf, *offset, 8)?;
    let matches = &buf[*offset..*offset + 7] == expected && buf[*offset + 7] == 0;
    *offset += 8;
    Ok(matches)
}
