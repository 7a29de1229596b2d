//! Append-only, CRC-protected write-ahead log.
//!
//! Every mutation a table engine accepts is appended here before it
//! reaches the memtable. The on-disk layout is intentionally simple and
//! single-host: the header is a 7-byte magic plus a zero pad byte and a
//! `u32` version, and each record is `seq || key_len || val_len || key
//! || val || crc32`, with every integer field written little-endian (see
//! the crate-level design notes on WAL endianness — this is a deliberate
//! standardization of an otherwise "native-endian" format, not a bug).
//!
//! Recovery tolerates corruption by truncation: a record that fails its
//! CRC, or a short read anywhere in the stream, stops replay at the last
//! good record rather than failing the whole open. A mismatched header
//! (wrong magic or version) is treated the same way one level up — the
//! log is silently replaced with a fresh, empty one.


use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// 7-byte magic identifying a `commitlog.bin` file, followed by one
/// `0x00` pad byte in the on-disk header.
pub const WAL_MAGIC: &[u8; 7] = b"BZWAL02";

/// Current WAL header version.
pub const WAL_VERSION: u32 = 2;

const HEADER_LEN: u64 = 8 + 4; // magic+pad, version

/// Errors raised by the write-ahead log.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalError {
    /// The commit log file could not be opened or created.
    #[error("cannot open commit log: {0}")]
    CannotOpen(#[source] io::Error),

    /// A write to the commit log failed.
    #[error("wal write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// A read from the commit log failed.
    #[error("wal read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// `fsync` on the commit log failed.
    #[error("wal fsync failed: {0}")]
    FsyncFailed(#[source] io::Error),
}

impl WalError {
    /// The wire error kind the server collaborator surfaces for this
    /// failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CannotOpen(_) => "cannot_open_commitlog",
            Self::WriteFailed(_) => "write_failed",
            Self::ReadFailed(_) => "read_failed",
            Self::FsyncFailed(_) => "fsync_failed",
        }
    }
}

/// One replayed WAL record: a sequence number plus the raw key/value
/// bytes as they were appended (the key is always a decorated key; the
/// value is row bytes, or empty for a tombstone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub seq: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

fn build_header() -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN as usize);
    buf.extend_from_slice(WAL_MAGIC);
    buf.push(0);
    buf.extend_from_slice(&WAL_VERSION.to_le_bytes());
    buf
}

/// Returns `Ok(true)` if `file`'s current position is at the start of a
/// valid header and leaves the cursor just past it; `Ok(false)` if the
/// header bytes don't match (cursor position is unspecified); propagates
/// I/O errors for anything else.
fn header_matches(file: &mut File) -> io::Result<bool> {
    file.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; HEADER_LEN as usize];
    match file.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e),
    }
    let magic_ok = &header[0..7] == WAL_MAGIC && header[7] == 0;
    let version = u32::from_le_bytes(header[8..12].try_into().expect("4 bytes"));
    Ok(magic_ok && version == WAL_VERSION)
}

fn record_image(seq: u64, key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 4 + 4 + key.len() + value.len());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}

/// A live handle on a table's `commitlog.bin`, open for append.
#[derive(Debug)]
pub struct Wal {
    file: File,
    path: PathBuf,
    bytes_since_fsync: u64,
    dirty: bool,
}

impl Wal {
    /// Opens the WAL at `path`, creating it if absent.
    ///
    /// `truncate = true` always starts from a fresh, empty log (used by
    /// table creation and after a successful flush). `truncate = false`
    /// validates the existing header and, on mismatch, silently resets
    /// the file to a fresh empty log rather than failing.
    pub fn open_or_create(path: impl AsRef<Path>, truncate: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(truncate)
            .open(&path)
            .map_err(WalError::CannotOpen)?;

        if truncate {
            file.write_all(&build_header()).map_err(WalError::WriteFailed)?;
        } else {
            let ok = header_matches(&mut file).map_err(WalError::ReadFailed)?;
            if !ok {
                warn!(path = %path.display(), "wal header mismatch, resetting to a fresh log");
                file.set_len(0).map_err(WalError::WriteFailed)?;
                file.seek(SeekFrom::Start(0)).map_err(WalError::WriteFailed)?;
                file.write_all(&build_header()).map_err(WalError::WriteFailed)?;
            } else {
                file.seek(SeekFrom::End(0)).map_err(WalError::ReadFailed)?;
            }
        }

        Ok(Self {
            file,
            path,
            bytes_since_fsync: 0,
            dirty: false,
        })
    }

    /// Appends one record, advancing the dirty-byte counters.
    pub fn append(&mut self, seq: u64, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        let mut image = record_image(seq, key, value);
        let crc = crate::codec::crc32(&image);
        image.extend_from_slice(&crc.to_le_bytes());
        self.file.write_all(&image).map_err(WalError::WriteFailed)?;
        self.bytes_since_fsync += image.len() as u64;
        self.dirty = true;
        Ok(())
    }

    /// Fsyncs the commit log and clears the dirty counters.
    pub fn fsync_now(&mut self) -> Result<(), WalError> {
        self.file.sync_data().map_err(WalError::FsyncFailed)?;
        self.bytes_since_fsync = 0;
        self.dirty = false;
        Ok(())
    }

    /// Bytes appended since the last successful fsync.
    pub fn bytes_since_fsync(&self) -> u64 {
        self.bytes_since_fsync
    }

    /// Whether there are appends not yet covered by an fsync.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Path of the underlying commit log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads every well-formed record from `path`, stopping silently at the
/// first corrupt or short record (or at a mismatched header, which
/// yields an empty result). This is a read-only pass independent of any
/// open [`Wal`] handle, used purely to reconstruct in-memory state
/// during recovery.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<WalRecord>, WalError> {
    let path = path.as_ref();
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WalError::ReadFailed(e)),
    };

    if !header_matches(&mut file).map_err(WalError::ReadFailed)? {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    loop {
        let mut fixed = [0u8; 16];
        match file.read_exact(&mut fixed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "wal read error, truncating replay at last good record");
                break;
            }
        }
        let seq = u64::from_le_bytes(fixed[0..8].try_into().expect("8 bytes"));
        let key_len = u32::from_le_bytes(fixed[8..12].try_into().expect("4 bytes")) as usize;
        let val_len = u32::from_le_bytes(fixed[12..16].try_into().expect("4 bytes")) as usize;

        let mut body = vec![0u8; key_len + val_len];
        if file.read_exact(&mut body).is_err() {
            warn!(path = %path.display(), "wal record body truncated, stopping replay");
            break;
        }
        let mut crc_bytes = [0u8; 4];
        if file.read_exact(&mut crc_bytes).is_err() {
            warn!(path = %path.display(), "wal record crc truncated, stopping replay");
            break;
        }
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut image = Vec::with_capacity(16 + body.len());
        image.extend_from_slice(&fixed);
        image.extend_from_slice(&body);
        let computed = crate::codec::crc32(&image);
        if computed != stored_crc {
            warn!(path = %path.display(), seq, "wal record crc mismatch, stopping replay");
            break;
        }

        let key = body[..key_len].to_vec();
        let value = body[key_len..].to_vec();
        records.push(WalRecord { seq, key, value });
    }

    Ok(records)
}
