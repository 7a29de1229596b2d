//! Façade over keyspace and table lifecycle management.
//!
//! `Engine` owns the data root directory and a cache of open
//! [`Table`](crate::table::Table) handles keyed by `"<keyspace>.<table>"`.
//! It is the only type embedders construct directly; everything else in
//! this crate is reached through it or through a `Table` it hands back.
//! A single mutex serializes cache lookups and keyspace/table-directory
//! mutations — table operations themselves re-lock internally once a
//! handle is obtained, so concurrent readers/writers on different (or
//! the same) tables don't contend on the façade's lock.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::keyspace::{self, SchemaRegistryError};
use crate::schema::TableSchema;
use crate::table::{Table, TableError, TableSettings};

/// Errors raised by the engine façade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    SchemaRegistry(#[from] SchemaRegistryError),

    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("table {0}.{1} already exists")]
    TableExists(String, String),

    #[error("table {0}.{1} exists with a different schema")]
    SchemaMismatch(String, String),

    #[error("table {0}.{1} not found")]
    TableNotFound(String, String),

    #[error("keyspace {0} not found")]
    KeyspaceNotFound(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table(e) => e.kind(),
            Self::SchemaRegistry(e) => e.kind(),
            Self::Io(_) => "write_failed",
            Self::TableExists(_, _) => "table_exists",
            Self::SchemaMismatch(_, _) => "schema_mismatch",
            Self::TableNotFound(_, _) => "table_not_found",
            Self::KeyspaceNotFound(_) => "keyspace_not_found",
            Self::InvalidIdentifier(_) => "bad_row",
        }
    }
}

/// Validates an ASCII SQL-style identifier: `[A-Za-z_][A-Za-z0-9_]*`.
fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn require_identifier(s: &str) -> Result<(), EngineError> {
    if is_valid_identifier(s) {
        Ok(())
    } else {
        Err(EngineError::InvalidIdentifier(s.to_string()))
    }
}

fn random_uuid_hex() -> String {
    let mut rng = rand::rng();
    let mut out = String::with_capacity(32);
    for _ in 0..32 {
        let nibble: u8 = rng.random_range(0..16);
        out.push(std::char::from_digit(nibble as u32, 16).expect("valid hex digit"));
    }
    out
}

fn keyspace_dir(data_dir: &Path, keyspace: &str) -> PathBuf {
    data_dir.join(keyspace)
}
fn keyspace_schema_path(data_dir: &Path, keyspace: &str) -> PathBuf {
    keyspace_dir(data_dir, keyspace).join("schema.bin")
}
fn table_dir(data_dir: &Path, keyspace: &str, table: &str, uuid: &str) -> PathBuf {
    keyspace_dir(data_dir, keyspace).join(format!("{table}-{uuid}"))
}
fn cache_key(keyspace: &str, table: &str) -> String {
    format!("{keyspace}.{table}")
}

/// The storage engine's entry point: owns the data root and the
/// open-table cache.
pub struct Engine {
    data_dir: PathBuf,
    open_tables: Mutex<HashMap<String, Arc<Table>>>,
}

impl Engine {
    /// Opens (creating if absent) the data root at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir, open_tables: Mutex::new(HashMap::new()) })
    }

    /// Root directory this engine was opened against.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Creates `keyspace` as a plain directory. Idempotent: creating an
    /// already-existing keyspace is not an error.
    pub fn create_keyspace(&self, keyspace: &str) -> Result<(), EngineError> {
        require_identifier(keyspace)?;
        fs::create_dir_all(keyspace_dir(&self.data_dir, keyspace))?;
        info!(keyspace, "keyspace created");
        Ok(())
    }

    /// Creates `table` in `keyspace` with `schema`. Fails with
    /// `table_exists` unless `if_not_exists` is set, in which case an
    /// existing table of the same name is left untouched as long as its
    /// stored schema matches; a mismatch fails with `schema_mismatch`.
    pub fn create_table(
        &self,
        keyspace: &str,
        table: &str,
        schema: TableSchema,
        if_not_exists: bool,
    ) -> Result<PathBuf, EngineError> {
        require_identifier(keyspace)?;
        require_identifier(table)?;

        let schema_path = keyspace_schema_path(&self.data_dir, keyspace);
        if let Some(uuid) = keyspace::find_table_uuid_from_schema(&schema_path, table) {
            if !if_not_exists {
                return Err(EngineError::TableExists(keyspace.to_string(), table.to_string()));
            }
            let dir = table_dir(&self.data_dir, keyspace, table, &uuid);
            let existing = Table::open_or_create(dir.clone(), keyspace, table, &uuid, None, TableSettings::default(), false)?;
            if existing.schema() != schema {
                return Err(EngineError::SchemaMismatch(keyspace.to_string(), table.to_string()));
            }
            self.open_tables.lock().unwrap().insert(cache_key(keyspace, table), existing);
            return Ok(dir);
        }

        let uuid = random_uuid_hex();
        let dir = table_dir(&self.data_dir, keyspace, table, &uuid);
        keyspace::upsert_table_uuid(&schema_path, table, &uuid)?;

        let handle = Table::open_or_create(dir.clone(), keyspace, table, &uuid, Some(schema), TableSettings::default(), true)?;
        self.open_tables.lock().unwrap().insert(cache_key(keyspace, table), handle);
        info!(keyspace, table, uuid, "table created");
        Ok(dir)
    }

    /// Returns a handle to `table` in `keyspace`, from cache or by
    /// opening it from disk. Fails with `table_not_found` if neither the
    /// keyspace schema nor a directory scan locates it.
    pub fn open_table(&self, keyspace: &str, table: &str) -> Result<Arc<Table>, EngineError> {
        require_identifier(keyspace)?;
        require_identifier(table)?;

        let key = cache_key(keyspace, table);
        if let Some(handle) = self.open_tables.lock().unwrap().get(&key) {
            return Ok(Arc::clone(handle));
        }

        let schema_path = keyspace_schema_path(&self.data_dir, keyspace);
        let uuid = match keyspace::find_table_uuid_from_schema(&schema_path, table) {
            Some(uuid) => uuid,
            None => {
                let scanned = keyspace::find_table_uuid_by_scan(&keyspace_dir(&self.data_dir, keyspace), table)
                    .ok_or_else(|| EngineError::TableNotFound(keyspace.to_string(), table.to_string()))?;
                warn!(keyspace, table, uuid = %scanned, "recovered table uuid by directory scan");
                keyspace::upsert_table_uuid(&schema_path, table, &scanned)?;
                scanned
            }
        };

        let dir = table_dir(&self.data_dir, keyspace, table, &uuid);
        let handle = Table::open_or_create(dir, keyspace, table, &uuid, None, TableSettings::default(), false)?;
        self.open_tables.lock().unwrap().insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Drops `table` from `keyspace`: evicts and shuts down any cached
    /// handle, removes its schema registration, and deletes its
    /// directory. Honors `if_exists`.
    pub fn drop_table(&self, keyspace: &str, table: &str, if_exists: bool) -> Result<(), EngineError> {
        require_identifier(keyspace)?;
        require_identifier(table)?;

        let key = cache_key(keyspace, table);
        if let Some(handle) = self.open_tables.lock().unwrap().remove(&key) {
            handle.shutdown()?;
        }

        let schema_path = keyspace_schema_path(&self.data_dir, keyspace);
        let uuid = match keyspace::find_table_uuid_from_schema(&schema_path, table) {
            Some(uuid) => Some(uuid),
            None => keyspace::find_table_uuid_by_scan(&keyspace_dir(&self.data_dir, keyspace), table),
        };

        let Some(uuid) = uuid else {
            if if_exists {
                return Ok(());
            }
            return Err(EngineError::TableNotFound(keyspace.to_string(), table.to_string()));
        };

        keyspace::remove_table_from_schema(&schema_path, table)?;
        let dir = table_dir(&self.data_dir, keyspace, table, &uuid);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        info!(keyspace, table, "table dropped");
        Ok(())
    }

    /// Drops an entire keyspace: shuts down and evicts every cached
    /// table under it, then removes the keyspace directory. Honors
    /// `if_exists`.
    pub fn drop_keyspace(&self, keyspace: &str, if_exists: bool) -> Result<(), EngineError> {
        require_identifier(keyspace)?;

        let dir = keyspace_dir(&self.data_dir, keyspace);
        if !dir.exists() {
            if if_exists {
                return Ok(());
            }
            return Err(EngineError::KeyspaceNotFound(keyspace.to_string()));
        }

        let prefix = format!("{keyspace}.");
        let mut tables = self.open_tables.lock().unwrap();
        let stale_keys: Vec<String> = tables.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
        for key in stale_keys {
            if let Some(handle) = tables.remove(&key) {
                handle.shutdown()?;
            }
        }
        drop(tables);

        fs::remove_dir_all(&dir)?;
        info!(keyspace, "keyspace dropped");
        Ok(())
    }

    /// Truncates `table`'s data in place, keeping its schema and UUID.
    pub fn truncate_table(&self, keyspace: &str, table: &str) -> Result<(), EngineError> {
        let handle = self.open_table(keyspace, table)?;
        handle.truncate()?;
        Ok(())
    }

    /// Sorted list of immediate subdirectories of the data root whose
    /// names are valid identifiers.
    pub fn list_keyspaces(&self) -> Result<Vec<String>, EngineError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)?.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_identifier(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Sorted, de-duplicated list of table names registered under
    /// `keyspace`, derived from its subdirectory names (`<table>-<rest>`).
    pub fn list_tables(&self, keyspace: &str) -> Result<Vec<String>, EngineError> {
        require_identifier(keyspace)?;
        let dir = keyspace_dir(&self.data_dir, keyspace);
        let mut names = std::collections::BTreeSet::new();
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        for entry in read_dir.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            let Some((table, _rest)) = name.split_once('-') else { continue };
            if !table.is_empty() && is_valid_identifier(table) {
                names.insert(table.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}
