//! The durable record of which SSTables make up a table and how far its
//! WAL has been flushed.
//!
//! `manifest.bin` is small and rewritten wholesale on every flush: magic
//! and version header via [`crate::codec`], then `last_flushed_seq`,
//! `next_sstable_gen`, and the SSTable filename list via
//! [`crate::encoding`]'s native-endian `Encode`/`Decode` traits — the
//! same split used by `schema.bin` and `metadata.bin`. The filename list
//! is stored in creation order (oldest first), which is also the order
//! the table engine reads it back into memory, so "newest SSTable" is
//! always the last element.
//!
//! A missing, truncated, or version-mismatched manifest is not an
//! error: [`read_manifest`] falls back to [`Manifest::default`] and logs
//! a warning, on the assumption that a table with no manifest yet has
//! simply never been flushed.

#[cfg(test)]
mod tests;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::codec;
use crate::encoding::{Decode, Encode};

/// 7-byte magic at the start of `manifest.bin`.
pub const MANIFEST_MAGIC: &[u8; 7] = b"BZMF001";
/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Errors raised writing a manifest. Reading never fails — see
/// [`read_manifest`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    #[error("cannot write manifest: {0}")]
    CannotWrite(#[source] io::Error),
}

impl ManifestError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CannotWrite(_) => "cannot_write_manifest",
        }
    }
}

/// The full durable state of one table's SSTable generation, aside from
/// the SSTables' own bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Highest WAL sequence number known to be captured in some SSTable.
    pub last_flushed_seq: u64,
    /// The generation number the next flush should use for its filename.
    pub next_sstable_gen: u64,
    /// SSTable filenames, oldest first, relative to the table directory.
    pub sstable_files: Vec<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            last_flushed_seq: 0,
            next_sstable_gen: 1,
            sstable_files: Vec::new(),
        }
    }
}

fn try_read_manifest(path: &Path) -> Option<Manifest> {
    let bytes = fs::read(path).ok()?;
    if bytes.len() < 8 {
        return None;
    }
    let mut pos = 0usize;
    let magic_ok = codec::check_magic(&bytes, &mut pos, MANIFEST_MAGIC).ok()?;
    if !magic_ok {
        return None;
    }
    let (version, n) = u32::decode_from(&bytes[pos..]).ok()?;
    pos += n;
    if version != MANIFEST_VERSION {
        return None;
    }
    let (last_flushed_seq, n) = u64::decode_from(&bytes[pos..]).ok()?;
    pos += n;
    let (next_sstable_gen, n) = u64::decode_from(&bytes[pos..]).ok()?;
    pos += n;
    let (file_count, n) = u64::decode_from(&bytes[pos..]).ok()?;
    pos += n;

    let mut sstable_files = Vec::with_capacity(file_count as usize);
    for _ in 0..file_count {
        let (name, n) = String::decode_from(&bytes[pos..]).ok()?;
        pos += n;
        sstable_files.push(name);
    }

    Some(Manifest { last_flushed_seq, next_sstable_gen, sstable_files })
}

/// Reads the manifest at `path`, falling back to [`Manifest::default`]
/// on any missing file, corruption, or version mismatch.
pub fn read_manifest(path: &Path) -> Manifest {
    match try_read_manifest(path) {
        Some(m) => m,
        None => {
            if path.exists() {
                warn!(path = %path.display(), "manifest unreadable or stale, starting from an empty one");
            }
            Manifest::default()
        }
    }
}

/// Writes `manifest` to `path` atomically (write to a temp file, then
/// rename over the destination).
pub fn write_manifest_atomic(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let mut buf = Vec::new();
    codec::put_magic(&mut buf, MANIFEST_MAGIC);
    MANIFEST_VERSION.encode_to(&mut buf).map_err(|e| ManifestError::CannotWrite(io::Error::other(e)))?;
    manifest
        .last_flushed_seq
        .encode_to(&mut buf)
        .map_err(|e| ManifestError::CannotWrite(io::Error::other(e)))?;
    manifest
        .next_sstable_gen
        .encode_to(&mut buf)
        .map_err(|e| ManifestError::CannotWrite(io::Error::other(e)))?;
    (manifest.sstable_files.len() as u64)
        .encode_to(&mut buf)
        .map_err(|e| ManifestError::CannotWrite(io::Error::other(e)))?;
    for name in &manifest.sstable_files {
        name.encode_to(&mut buf).map_err(|e| ManifestError::CannotWrite(io::Error::other(e)))?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path).map_err(ManifestError::CannotWrite)?;
    file.write_all(&buf).map_err(ManifestError::CannotWrite)?;
    file.sync_all().map_err(ManifestError::CannotWrite)?;
    fs::rename(&tmp_path, path).map_err(ManifestError::CannotWrite)?;
    Ok(())
}
