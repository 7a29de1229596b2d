//! Immutable, on-disk sorted run produced by a table flush.
//!
//! Layout: a header (magic, pad, version, entry count), the entries
//! themselves in ascending key order, a sparse index (every `stride`th
//! key plus the first, mapping key to the byte offset of its entry),
//! and a fixed-size footer pointing at the index. Every integer field
//! in this module is big-endian, written through [`crate::codec`] — the
//! same convention used for row bytes and WAL record payloads.
//!
//! A reader loads only the index into memory at open time and closes
//! the file handle; point lookups and scans reopen the file as needed.
//! This keeps an open table's steady-state memory proportional to its
//! number of SSTables times their index size, not their data size.


use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec;

/// 7-byte magic at the start of every SSTable file.
pub const SSTABLE_HEADER_MAGIC: &[u8; 7] = b"BZST001";
/// 7-byte magic at the start of the index block.
pub const SSTABLE_INDEX_MAGIC: &[u8; 7] = b"BZIX001";
/// 7-byte magic at the start of the trailing footer.
pub const SSTABLE_FOOTER_MAGIC: &[u8; 7] = b"BZEND01";
/// Current SSTable format version.
pub const SSTABLE_VERSION: u32 = 1;
/// Default number of data entries between consecutive sparse index points.
pub const DEFAULT_INDEX_STRIDE: usize = 16;

const FOOTER_LEN: u64 = 8 + 8; // magic+pad, index_start

/// Errors raised while writing or reading an SSTable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SsTableError {
    #[error("cannot write sstable: {0}")]
    CannotWrite(#[source] io::Error),

    #[error("bad sstable footer")]
    BadFooter,

    #[error("bad sstable index")]
    BadIndex,

    #[error("sstable file too small")]
    TooSmall,

    #[error("sstable read failed: {0}")]
    ReadFailed(#[source] io::Error),
}

impl SsTableError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CannotWrite(_) => "cannot_write_sstable",
            Self::BadFooter => "bad_sstable_footer",
            Self::BadIndex => "bad_index",
            Self::TooSmall => "sstable_too_small",
            Self::ReadFailed(_) => "read_failed",
        }
    }
}

/// One row occupying a single SSTable slot: a decorated key, the
/// sequence number it was flushed with, and its row bytes (empty means
/// tombstone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsTableEntry {
    pub key: Vec<u8>,
    pub seq: u64,
    pub value: Vec<u8>,
}

fn encode_entry(entry: &SsTableEntry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + entry.key.len() + 8 + 4 + entry.value.len());
    codec::put_u32_be(&mut buf, entry.key.len() as u32);
    buf.extend_from_slice(&entry.key);
    codec::put_u64_be(&mut buf, entry.seq);
    codec::put_u32_be(&mut buf, entry.value.len() as u32);
    buf.extend_from_slice(&entry.value);
    buf
}

fn read_entry(file: &mut File) -> Result<Option<SsTableEntry>, SsTableError> {
    let mut len_buf = [0u8; 4];
    match file.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(SsTableError::ReadFailed(e)),
    }
    let key_len = u32::from_be_bytes(len_buf) as usize;
    let mut key = vec![0u8; key_len];
    file.read_exact(&mut key).map_err(SsTableError::ReadFailed)?;

    let mut seq_buf = [0u8; 8];
    file.read_exact(&mut seq_buf).map_err(SsTableError::ReadFailed)?;
    let seq = u64::from_be_bytes(seq_buf);

    let mut val_len_buf = [0u8; 4];
    file.read_exact(&mut val_len_buf).map_err(SsTableError::ReadFailed)?;
    let val_len = u32::from_be_bytes(val_len_buf) as usize;
    let mut value = vec![0u8; val_len];
    file.read_exact(&mut value).map_err(SsTableError::ReadFailed)?;

    Ok(Some(SsTableEntry { key, seq, value }))
}

/// Writes a new SSTable at `path` containing `entries`, which must
/// already be sorted ascending by key. `stride` of `0` is normalized to
/// [`DEFAULT_INDEX_STRIDE`]. The caller owns atomicity (write to a temp
/// path, then rename).
pub fn write_sstable(path: &Path, entries: &[SsTableEntry], stride: usize) -> Result<(), SsTableError> {
    let stride = if stride == 0 { DEFAULT_INDEX_STRIDE } else { stride };

    let mut out = Vec::new();
    codec::put_magic(&mut out, SSTABLE_HEADER_MAGIC);
    codec::put_u32_be(&mut out, SSTABLE_VERSION);
    codec::put_u64_be(&mut out, entries.len() as u64);

    let mut index: Vec<(Vec<u8>, u64)> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        if i % stride == 0 {
            index.push((entry.key.clone(), out.len() as u64));
        }
        out.extend_from_slice(&encode_entry(entry));
    }

    let index_start = out.len() as u64;
    codec::put_magic(&mut out, SSTABLE_INDEX_MAGIC);
    codec::put_u64_be(&mut out, index.len() as u64);
    for (key, offset) in &index {
        codec::put_u32_be(&mut out, key.len() as u32);
        out.extend_from_slice(key);
        codec::put_u64_be(&mut out, *offset);
    }

    codec::put_magic(&mut out, SSTABLE_FOOTER_MAGIC);
    codec::put_u64_be(&mut out, index_start);

    let mut file = File::create(path).map_err(SsTableError::CannotWrite)?;
    file.write_all(&out).map_err(SsTableError::CannotWrite)?;
    file.sync_all().map_err(SsTableError::CannotWrite)?;
    Ok(())
}

/// A handle on an immutable, already-written SSTable. Cheap to clone:
/// only the sparse index lives in memory.
#[derive(Debug, Clone)]
pub struct SsTableReader {
    path: PathBuf,
    index: Vec<(Vec<u8>, u64)>,
    data_start: u64,
    data_end: u64,
}

impl SsTableReader {
    /// Opens `path`, validating its header and footer and loading the
    /// sparse index into memory. The file handle is not retained.
    pub fn open(path: &Path) -> Result<Self, SsTableError> {
        let mut file = File::open(path).map_err(SsTableError::ReadFailed)?;
        let len = file.metadata().map_err(SsTableError::ReadFailed)?.len();
        if len < FOOTER_LEN + 8 {
            return Err(SsTableError::TooSmall);
        }

        file.seek(SeekFrom::End(-(FOOTER_LEN as i64))).map_err(SsTableError::ReadFailed)?;
        let mut footer = [0u8; FOOTER_LEN as usize];
        file.read_exact(&mut footer).map_err(SsTableError::ReadFailed)?;
        let mut pos = 0usize;
        let footer_ok = codec::check_magic(&footer, &mut pos, SSTABLE_FOOTER_MAGIC)
            .map_err(|_| SsTableError::BadFooter)?;
        if !footer_ok {
            return Err(SsTableError::BadFooter);
        }
        let index_start = codec::get_u64_be(&footer, &mut pos).map_err(|_| SsTableError::BadFooter)?;

        file.seek(SeekFrom::Start(index_start)).map_err(SsTableError::ReadFailed)?;
        let mut index_buf = vec![0u8; (len - FOOTER_LEN - index_start) as usize];
        file.read_exact(&mut index_buf).map_err(SsTableError::ReadFailed)?;

        let mut pos = 0usize;
        let index_ok = codec::check_magic(&index_buf, &mut pos, SSTABLE_INDEX_MAGIC)
            .map_err(|_| SsTableError::BadIndex)?;
        if !index_ok {
            return Err(SsTableError::BadIndex);
        }
        let index_count = codec::get_u64_be(&index_buf, &mut pos).map_err(|_| SsTableError::BadIndex)?;

        let mut index = Vec::with_capacity(index_count as usize);
        for _ in 0..index_count {
            let key = codec::get_bytes_be(&index_buf, &mut pos).map_err(|_| SsTableError::BadIndex)?;
            let offset = codec::get_u64_be(&index_buf, &mut pos).map_err(|_| SsTableError::BadIndex)?;
            index.push((key, offset));
        }

        let data_start = 8 + 4 + 8; // magic+pad, version, entry_count
        Ok(Self {
            path: path.to_path_buf(),
            index,
            data_start,
            data_end: index_start,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up `key`, returning its entry if present. Reopens the file
    /// and scans linearly from the nearest index floor.
    pub fn get(&self, key: &[u8]) -> Result<Option<SsTableEntry>, SsTableError> {
        let pos = self.index.partition_point(|(k, _)| k.as_slice() <= key);
        if pos == 0 {
            return Ok(None);
        }
        let start = self.index[pos - 1].1;

        let mut file = File::open(&self.path).map_err(SsTableError::ReadFailed)?;
        file.seek(SeekFrom::Start(start)).map_err(SsTableError::ReadFailed)?;

        loop {
            if file.stream_position().map_err(SsTableError::ReadFailed)? >= self.data_end {
                return Ok(None);
            }
            let entry = match read_entry(&mut file)? {
                Some(e) => e,
                None => return Ok(None),
            };
            match entry.key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(entry)),
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Less => continue,
            }
        }
    }

    /// Reads every entry in the table, in ascending key order.
    pub fn scan_all(&self) -> Result<Vec<SsTableEntry>, SsTableError> {
        let mut file = File::open(&self.path).map_err(SsTableError::ReadFailed)?;
        file.seek(SeekFrom::Start(self.data_start)).map_err(SsTableError::ReadFailed)?;

        let mut entries = Vec::new();
        loop {
            if file.stream_position().map_err(SsTableError::ReadFailed)? >= self.data_end {
                break;
            }
            match read_entry(&mut file)? {
                Some(e) => entries.push(e),
                None => break,
            }
        }
        Ok(entries)
    }
}
