//! Per-keyspace table registry: `schema.bin` maps table names to the
//! UUID suffix of their on-disk directory.
//!
//! The file is small and rewritten wholesale on every mutation, the
//! same pattern [`crate::manifest`] uses for `manifest.bin`. A missing
//! or corrupt `schema.bin` is never an error — it just means the
//! keyspace has no tables registered yet, recoverable by falling back
//! to [`find_table_uuid_by_scan`].

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;

use crate::codec;

/// 7-byte magic at the start of a keyspace's `schema.bin`.
pub const KEYSPACE_SCHEMA_MAGIC: &[u8; 7] = b"BZSC001";
/// Current keyspace schema format version.
pub const KEYSPACE_SCHEMA_VERSION: u32 = 1;

/// Errors raised while reading or writing a keyspace's `schema.bin`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaRegistryError {
    #[error("cannot write keyspace schema: {0}")]
    CannotWrite(#[source] io::Error),

    #[error("keyspace schema read failed: {0}")]
    ReadFailed(#[source] io::Error),
}

impl SchemaRegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CannotWrite(_) => "cannot_write_manifest",
            Self::ReadFailed(_) => "read_failed",
        }
    }
}

fn try_read_entries(path: &Path) -> Option<Vec<(String, String)>> {
    let bytes = fs::read(path).ok()?;
    if bytes.len() < 8 {
        return None;
    }
    let mut pos = 0usize;
    let magic_ok = codec::check_magic(&bytes, &mut pos, KEYSPACE_SCHEMA_MAGIC).ok()?;
    if !magic_ok {
        return None;
    }
    let version = codec::get_u32_be(&bytes, &mut pos).ok()?;
    if version != KEYSPACE_SCHEMA_VERSION {
        return None;
    }
    let count = codec::get_u64_be(&bytes, &mut pos).ok()?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = codec::get_str_be(&bytes, &mut pos).ok()?;
        let uuid = codec::get_str_be(&bytes, &mut pos).ok()?;
        entries.push((name, uuid));
    }
    Some(entries)
}

/// Reads every `(table_name, uuid)` pair from `path`. Returns an empty
/// list on a missing, truncated, or version-mismatched file.
fn read_entries(path: &Path) -> Vec<(String, String)> {
    try_read_entries(path).unwrap_or_default()
}

fn write_entries(path: &Path, entries: &[(String, String)]) -> Result<(), SchemaRegistryError> {
    let mut buf = Vec::new();
    codec::put_magic(&mut buf, KEYSPACE_SCHEMA_MAGIC);
    codec::put_u32_be(&mut buf, KEYSPACE_SCHEMA_VERSION);
    codec::put_u64_be(&mut buf, entries.len() as u64);
    for (name, uuid) in entries {
        codec::put_str_be(&mut buf, name);
        codec::put_str_be(&mut buf, uuid);
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path).map_err(SchemaRegistryError::CannotWrite)?;
    file.write_all(&buf).map_err(SchemaRegistryError::CannotWrite)?;
    file.sync_all().map_err(SchemaRegistryError::CannotWrite)?;
    fs::rename(&tmp_path, path).map_err(SchemaRegistryError::CannotWrite)?;
    Ok(())
}

/// Looks up `table`'s UUID in `path`'s registered entries.
pub fn find_table_uuid_from_schema(path: &Path, table: &str) -> Option<String> {
    read_entries(path).into_iter().find(|(name, _)| name == table).map(|(_, uuid)| uuid)
}

/// Registers (or overwrites) `table`'s UUID, rewriting the whole file.
pub fn upsert_table_uuid(path: &Path, table: &str, uuid: &str) -> Result<(), SchemaRegistryError> {
    let mut entries = read_entries(path);
    match entries.iter_mut().find(|(name, _)| name == table) {
        Some(entry) => entry.1 = uuid.to_string(),
        None => entries.push((table.to_string(), uuid.to_string())),
    }
    write_entries(path, &entries)
}

/// Removes `table`'s registration, returning whether it was present.
pub fn remove_table_from_schema(path: &Path, table: &str) -> Result<bool, SchemaRegistryError> {
    let mut entries = read_entries(path);
    let before = entries.len();
    entries.retain(|(name, _)| name != table);
    let removed = entries.len() != before;
    if removed {
        write_entries(path, &entries)?;
    }
    Ok(removed)
}

/// Fallback when `schema.bin` doesn't (yet) know about `table`: scans
/// `dir` for a subdirectory named `<table>-<uuid>` and recovers the
/// UUID suffix.
pub fn find_table_uuid_by_scan(dir: &Path, table: &str) -> Option<String> {
    let prefix = format!("{table}-");
    let read_dir = fs::read_dir(dir).ok()?;
    for entry in read_dir.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_str()?;
        if let Some(uuid) = name.strip_prefix(&prefix) {
            if entry.path().is_dir() {
                return Some(uuid.to_string());
            }
        }
    }
    None
}
