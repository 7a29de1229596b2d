//! Per-table LSM engine: orchestrates the WAL, memtable, SSTables, and
//! manifest behind a single mutex.
//!
//! A `Table` owns one directory on disk (`<keyspace>/<table>-<uuid>/`)
//! and everything under it. Every public operation locks
//! [`TableInner`] for its duration, except [`Table::flush`], which
//! snapshots the memtable, releases the lock across the slow SSTable
//! write, then re-acquires it to commit the manifest swap — the same
//! shape the manifest module's atomic-rename pattern uses one level
//! down.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec;
use crate::encoding::{Decode, Encode, EncodingError};
use crate::manifest::{self, Manifest, ManifestError};
use crate::memtable::Memtable;
use crate::schema::{ColumnDef, ColumnType, RowCodecError, TableSchema};
use crate::sstable::{self, SsTableEntry, SsTableError, SsTableReader};
use crate::tokenizer;
use crate::wal::{self, Wal, WalError};

/// 7-byte magic at the start of `metadata.bin`.
pub const METADATA_MAGIC: &[u8; 7] = b"BZMD002";
/// Current metadata format version.
pub const METADATA_VERSION: u32 = 2;

/// Which WAL-durability policy a table enforces on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalFsyncPolicy {
    /// Fsync after every append.
    Always,
    /// A background worker fsyncs on a timer.
    Periodic,
    /// Fsync only happens as a side effect of `flush` truncating the WAL.
    Disabled,
}

impl Default for WalFsyncPolicy {
    fn default() -> Self {
        Self::Disabled
    }
}

impl From<&str> for WalFsyncPolicy {
    /// Maps the wire-level config strings `"always"`/`"periodic"` to
    /// their variant; anything else, including absence, is `Disabled`.
    fn from(s: &str) -> Self {
        match s {
            "always" => Self::Always,
            "periodic" => Self::Periodic,
            _ => Self::Disabled,
        }
    }
}

/// Per-table tunables. Constructed directly by the embedder; this crate
/// never reads a config file or environment variable itself.
#[derive(Debug, Clone, Copy)]
pub struct TableSettings {
    pub wal_fsync: WalFsyncPolicy,
    pub wal_fsync_interval_ms: u64,
    pub wal_fsync_bytes: u64,
    pub memtable_max_bytes: u64,
    pub sstable_index_stride: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            wal_fsync: WalFsyncPolicy::Disabled,
            wal_fsync_interval_ms: 50,
            wal_fsync_bytes: 0,
            memtable_max_bytes: 0,
            sstable_index_stride: sstable::DEFAULT_INDEX_STRIDE,
        }
    }
}

impl TableSettings {
    /// Returns a copy with `sstable_index_stride` of `0` normalized to
    /// the default stride.
    pub fn normalized(mut self) -> Self {
        if self.sstable_index_stride == 0 {
            self.sstable_index_stride = sstable::DEFAULT_INDEX_STRIDE;
        }
        self
    }
}

/// Errors raised by the per-table engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TableError {
    #[error(transparent)]
    Wal(#[from] WalError),

    #[error(transparent)]
    SsTable(#[from] SsTableError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    RowCodec(#[from] RowCodecError),

    #[error("table I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("metadata encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("metadata.bin is missing")]
    MissingMetadata,

    #[error("metadata.bin is corrupt: {0}")]
    BadMetadata(String),

    #[error("cannot write metadata: {0}")]
    CannotWriteMetadata(#[source] io::Error),
}

impl TableError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Wal(e) => e.kind(),
            Self::SsTable(e) => e.kind(),
            Self::Manifest(e) => e.kind(),
            Self::RowCodec(e) => e.kind(),
            Self::Io(_) => "write_failed",
            Self::Encoding(_) => "bad_metadata",
            Self::MissingMetadata => "missing_metadata",
            Self::BadMetadata(_) => "bad_metadata",
            Self::CannotWriteMetadata(_) => "cannot_write_metadata",
        }
    }
}

fn encoding_to_table_err(e: EncodingError) -> TableError {
    TableError::Encoding(e)
}

/// Writes `metadata.bin`, which is written exactly once at table
/// creation and never modified afterward.
fn write_metadata(path: &Path, uuid: &str, keyspace: &str, table: &str, schema: &TableSchema, creation_time_secs: u64) -> Result<(), TableError> {
    let mut buf = Vec::new();
    codec::put_magic(&mut buf, METADATA_MAGIC);
    METADATA_VERSION.encode_to(&mut buf).map_err(encoding_to_table_err)?;
    uuid.to_string().encode_to(&mut buf).map_err(encoding_to_table_err)?;
    keyspace.to_string().encode_to(&mut buf).map_err(encoding_to_table_err)?;
    table.to_string().encode_to(&mut buf).map_err(encoding_to_table_err)?;
    creation_time_secs.encode_to(&mut buf).map_err(encoding_to_table_err)?;
    (schema.primary_key_index as u32).encode_to(&mut buf).map_err(encoding_to_table_err)?;
    (schema.columns.len() as u32).encode_to(&mut buf).map_err(encoding_to_table_err)?;
    for col in &schema.columns {
        col.name.clone().encode_to(&mut buf).map_err(encoding_to_table_err)?;
        col.col_type.type_id().encode_to(&mut buf).map_err(encoding_to_table_err)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path).map_err(TableError::CannotWriteMetadata)?;
    file.write_all(&buf).map_err(TableError::CannotWriteMetadata)?;
    file.sync_all().map_err(TableError::CannotWriteMetadata)?;
    fs::rename(&tmp_path, path).map_err(TableError::CannotWriteMetadata)?;
    Ok(())
}

struct LoadedMetadata {
    uuid: String,
    keyspace: String,
    table: String,
    schema: TableSchema,
}

fn read_metadata(path: &Path) -> Result<LoadedMetadata, TableError> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            TableError::MissingMetadata
        } else {
            TableError::Io(e)
        }
    })?;
    if bytes.len() < 8 {
        return Err(TableError::BadMetadata("file too short".into()));
    }
    let mut pos = 0usize;
    let magic_ok = codec::check_magic(&bytes, &mut pos, METADATA_MAGIC)
        .map_err(|e| TableError::BadMetadata(e.to_string()))?;
    if !magic_ok {
        return Err(TableError::BadMetadata("bad magic".into()));
    }
    let (version, n) = u32::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
    pos += n;
    if version != METADATA_VERSION {
        return Err(TableError::BadMetadata(format!("unsupported version {version}")));
    }
    let (uuid, n) = String::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
    pos += n;
    let (keyspace, n) = String::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
    pos += n;
    let (table, n) = String::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
    pos += n;
    let (_creation_time, n) = u64::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
    pos += n;
    let (pk_index, n) = u32::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
    pos += n;
    let (col_count, n) = u32::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
    pos += n;

    let mut columns = Vec::with_capacity(col_count as usize);
    for _ in 0..col_count {
        let (name, n) = String::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
        pos += n;
        let (type_id, n) = u8::decode_from(&bytes[pos..]).map_err(|e| TableError::BadMetadata(e.to_string()))?;
        pos += n;
        let col_type = ColumnType::from_type_id(type_id)
            .ok_or_else(|| TableError::BadMetadata(format!("unknown type id {type_id}")))?;
        columns.push(ColumnDef::new(name, col_type));
    }

    let schema = TableSchema::new(columns, pk_index as usize).map_err(TableError::RowCodec)?;
    Ok(LoadedMetadata { uuid, keyspace, table, schema })
}

/// Mutable state guarded by [`Table`]'s lock.
#[derive(Debug)]
struct TableInner {
    schema: TableSchema,
    wal: Wal,
    memtable: Memtable,
    manifest: Manifest,
    sstables: Vec<SsTableReader>,
    next_seq: u64,
}

/// A single open table: one WAL, one memtable, an ordered list of
/// flushed SSTables, and the manifest tying them together.
#[derive(Debug)]
pub struct Table {
    dir: PathBuf,
    keyspace: String,
    name: String,
    uuid: String,
    settings: TableSettings,
    inner: Mutex<TableInner>,
    worker_stop: Arc<AtomicBool>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    self_weak: Mutex<Option<Weak<Table>>>,
}

fn metadata_path(dir: &Path) -> PathBuf {
    dir.join("metadata.bin")
}
fn manifest_path(dir: &Path) -> PathBuf {
    dir.join("manifest.bin")
}
fn commitlog_path(dir: &Path) -> PathBuf {
    dir.join("commitlog.bin")
}
fn tmp_dir_path(dir: &Path) -> PathBuf {
    dir.join("tmp")
}
fn sstable_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(file_name)
}

fn sstable_file_name(r#gen: u64) -> String {
    format!("sstable-{gen:06}.bin")
}

impl Table {
    /// Opens an existing table directory, or creates a brand-new one
    /// when `create_new` is true (in which case `schema` must be
    /// `Some`).
    pub fn open_or_create(
        dir: PathBuf,
        keyspace: &str,
        name: &str,
        uuid: &str,
        schema: Option<TableSchema>,
        settings: TableSettings,
        create_new: bool,
    ) -> Result<Arc<Table>, TableError> {
        let settings = settings.normalized();
        fs::create_dir_all(&dir)?;
        fs::create_dir_all(tmp_dir_path(&dir))?;

        let (schema, manifest) = if create_new {
            let schema = schema.expect("schema required when creating a new table");
            let creation_time = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            write_metadata(&metadata_path(&dir), uuid, keyspace, name, &schema, creation_time)?;
            let manifest = Manifest::default();
            manifest::write_manifest_atomic(&manifest_path(&dir), &manifest)?;
            Wal::open_or_create(commitlog_path(&dir), true)?;
            info!(keyspace, table = name, uuid, "created new table");
            (schema, manifest)
        } else {
            let loaded = read_metadata(&metadata_path(&dir))?;
            let manifest = manifest::read_manifest(&manifest_path(&dir));
            (loaded.schema, manifest)
        };

        let mut sstables = Vec::with_capacity(manifest.sstable_files.len());
        for file_name in &manifest.sstable_files {
            let reader = SsTableReader::open(&sstable_path(&dir, file_name))?;
            sstables.push(reader);
        }

        let mut memtable = Memtable::new();
        let mut next_seq = manifest.last_flushed_seq.saturating_add(1).max(1);
        for record in wal::read_records(commitlog_path(&dir))? {
            next_seq = next_seq.max(record.seq + 1);
            memtable.put(record.key, record.seq, record.value);
        }

        // Rewrite the log to hold exactly the replayed prefix. A corrupt
        // tail left on disk by a prior crash must never be appended past,
        // or a later restart would stop replay before writes made after
        // this recovery.
        let mut wal = Wal::open_or_create(commitlog_path(&dir), true)?;
        for (key, v) in memtable.snapshot() {
            wal.append(v.seq, &key, &v.value)?;
        }
        debug!(keyspace, table = name, sstables = sstables.len(), memtable_entries = memtable.len(), "table recovered");

        let inner = TableInner { schema, wal, memtable, manifest, sstables, next_seq };

        let table = Arc::new(Table {
            dir,
            keyspace: keyspace.to_string(),
            name: name.to_string(),
            uuid: uuid.to_string(),
            settings,
            inner: Mutex::new(inner),
            worker_stop: Arc::new(AtomicBool::new(false)),
            worker_handle: Mutex::new(None),
            self_weak: Mutex::new(None),
        });
        *table.self_weak.lock().unwrap() = Some(Arc::downgrade(&table));

        if settings.wal_fsync == WalFsyncPolicy::Periodic {
            table.start_background_worker();
        }

        Ok(table)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
    pub fn settings(&self) -> TableSettings {
        self.settings
    }

    /// Returns a clone of the table's schema.
    pub fn schema(&self) -> TableSchema {
        self.inner.lock().unwrap().schema.clone()
    }

    /// Current memtable byte estimate — an observable hint, not an
    /// auto-flush trigger.
    pub fn memtable_bytes(&self) -> usize {
        self.inner.lock().unwrap().memtable.bytes()
    }

    fn start_background_worker(self: &Arc<Self>) {
        let weak = self.self_weak.lock().unwrap().clone().expect("self_weak set at construction");
        let stop = Arc::clone(&self.worker_stop);
        let interval = Duration::from_millis(self.settings.wal_fsync_interval_ms);
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if stop.load(AtomicOrdering::Relaxed) {
                break;
            }
            let Some(table) = weak.upgrade() else { break };
            let mut inner = table.inner.lock().unwrap();
            if inner.wal.is_dirty() {
                if let Err(e) = inner.wal.fsync_now() {
                    warn!(keyspace = %table.keyspace, table = %table.name, error = %e, "background fsync failed");
                }
            }
        });
        *self.worker_handle.lock().unwrap() = Some(handle);
    }

    fn stop_worker(&self) {
        self.worker_stop.store(true, AtomicOrdering::Relaxed);
        if let Some(handle) = self.worker_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.worker_stop.store(false, AtomicOrdering::Relaxed);
    }

    /// Appends a write for `pk_bytes`, durable according to the table's
    /// fsync policy, then applies it to the memtable.
    pub fn put_row(&self, pk_bytes: &[u8], row_bytes: Vec<u8>) -> Result<(), TableError> {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let key = tokenizer::decorated_key_bytes(pk_bytes);
        inner.wal.append(seq, &key, &row_bytes)?;
        if self.settings.wal_fsync == WalFsyncPolicy::Always {
            inner.wal.fsync_now()?;
        }
        inner.memtable.put(key, seq, row_bytes);
        Ok(())
    }

    /// Writes a tombstone for `pk_bytes`.
    pub fn delete_row(&self, pk_bytes: &[u8]) -> Result<(), TableError> {
        self.put_row(pk_bytes, Vec::new())
    }

    /// Looks up the current row for `pk_bytes`, checking the memtable
    /// first and falling back to SSTables newest-first.
    pub fn get_row(&self, pk_bytes: &[u8]) -> Result<Option<Vec<u8>>, TableError> {
        let inner = self.inner.lock().unwrap();
        let key = tokenizer::decorated_key_bytes(pk_bytes);

        if let Some(v) = inner.memtable.get(&key) {
            return Ok(if v.value.is_empty() { None } else { Some(v.value.clone()) });
        }

        for reader in inner.sstables.iter().rev() {
            if let Some(entry) = reader.get(&key)? {
                return Ok(if entry.value.is_empty() { None } else { Some(entry.value) });
            }
        }
        Ok(None)
    }

    /// Returns every live row, sorted by primary key using a type-aware
    /// comparator, ascending unless `desc` is set.
    pub fn scan_all_rows_by_pk(&self, desc: bool) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TableError> {
        let (schema, mem_snapshot, sstables): (TableSchema, Vec<(Vec<u8>, crate::memtable::MemValue)>, Vec<SsTableReader>) = {
            let inner = self.inner.lock().unwrap();
            (inner.schema.clone(), inner.memtable.snapshot(), inner.sstables.clone())
        };

        let mut merged: std::collections::HashMap<Vec<u8>, (u64, Vec<u8>)> = std::collections::HashMap::new();
        for (key, v) in mem_snapshot {
            merged.insert(key, (v.seq, v.value));
        }
        for reader in &sstables {
            for entry in reader.scan_all()? {
                match merged.get(&entry.key) {
                    Some((seq, _)) if *seq >= entry.seq => {}
                    _ => {
                        merged.insert(entry.key, (entry.seq, entry.value));
                    }
                }
            }
        }

        let col_type = schema.primary_key_column().col_type;
        let mut rows: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter(|(_, (_, value))| !value.is_empty())
            .map(|(key, (_, value))| (tokenizer::pk_bytes_from_decorated(&key).to_vec(), value))
            .collect();

        rows.sort_by(|(a, _), (b, _)| compare_pk_typed(col_type, a, b));
        if desc {
            rows.reverse();
        }
        Ok(rows)
    }

    /// Persists the memtable as a new SSTable and rotates the manifest
    /// and WAL. A no-op if the memtable is empty.
    pub fn flush(&self) -> Result<(), TableError> {
        let snapshot = {
            let inner = self.inner.lock().unwrap();
            if inner.memtable.is_empty() {
                return Ok(());
            }
            inner.memtable.snapshot()
        };

        let mut entries: Vec<SsTableEntry> = snapshot
            .iter()
            .map(|(key, v)| SsTableEntry { key: key.clone(), seq: v.seq, value: v.value.clone() })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let max_seq = entries.iter().map(|e| e.seq).max().unwrap_or(0);

        let (file_name, r#gen) = {
            let inner = self.inner.lock().unwrap();
            (sstable_file_name(inner.manifest.next_sstable_gen), inner.manifest.next_sstable_gen)
        };
        let tmp_path = tmp_dir_path(&self.dir).join(format!("{file_name}.tmp"));
        sstable::write_sstable(&tmp_path, &entries, self.settings.sstable_index_stride)?;
        let final_path = sstable_path(&self.dir, &file_name);
        fs::rename(&tmp_path, &final_path)?;
        let reader = SsTableReader::open(&final_path)?;

        let mut inner = self.inner.lock().unwrap();
        inner.manifest.sstable_files.push(file_name.clone());
        inner.manifest.next_sstable_gen = r#gen + 1;
        inner.manifest.last_flushed_seq = inner.manifest.last_flushed_seq.max(max_seq);
        manifest::write_manifest_atomic(&manifest_path(&self.dir), &inner.manifest)?;
        inner.sstables.push(reader);

        for (key, v) in &snapshot {
            inner.memtable.remove_if_seq(key, v.seq);
        }
        let mut new_wal = Wal::open_or_create(commitlog_path(&self.dir), true)?;
        for (key, v) in inner.memtable.snapshot() {
            new_wal.append(v.seq, &key, &v.value)?;
        }
        inner.wal = new_wal;

        info!(keyspace = %self.keyspace, table = %self.name, file = %file_name, entries = entries.len(), "flush completed");
        Ok(())
    }

    /// Deletes every SSTable, the manifest, and the commit log, then
    /// resets in-memory state and starts fresh.
    pub fn truncate(&self) -> Result<(), TableError> {
        self.stop_worker();

        let mut inner = self.inner.lock().unwrap();
        for file_name in inner.manifest.sstable_files.clone() {
            let _ = fs::remove_file(sstable_path(&self.dir, &file_name));
        }
        let _ = fs::remove_file(manifest_path(&self.dir));
        let _ = fs::remove_file(commitlog_path(&self.dir));
        let _ = fs::remove_dir_all(tmp_dir_path(&self.dir));
        fs::create_dir_all(tmp_dir_path(&self.dir))?;

        inner.memtable.clear();
        inner.sstables.clear();
        inner.manifest = Manifest::default();
        inner.next_seq = 1;
        manifest::write_manifest_atomic(&manifest_path(&self.dir), &inner.manifest)?;
        inner.wal = Wal::open_or_create(commitlog_path(&self.dir), true)?;
        drop(inner);

        if self.settings.wal_fsync == WalFsyncPolicy::Periodic {
            if let Some(weak) = self.self_weak.lock().unwrap().clone() {
                if let Some(arc) = weak.upgrade() {
                    arc.start_background_worker();
                }
            }
        }
        info!(keyspace = %self.keyspace, table = %self.name, "table truncated");
        Ok(())
    }

    /// Stops the background worker, if any. Idempotent.
    pub fn shutdown(&self) -> Result<(), TableError> {
        self.stop_worker();
        Ok(())
    }
}

/// Compares two raw primary-key byte strings according to `col_type`'s
/// natural ordering, falling back to lexicographic comparison on
/// malformed (wrong-width) input.
pub fn compare_pk_typed(col_type: ColumnType, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match col_type {
        ColumnType::Text | ColumnType::Char | ColumnType::Blob => a.cmp(b),
        ColumnType::Boolean => a.cmp(b),
        ColumnType::Int32 | ColumnType::Date => match (<[u8; 4]>::try_from(a), <[u8; 4]>::try_from(b)) {
            (Ok(a), Ok(b)) => i32::from_be_bytes(a).cmp(&i32::from_be_bytes(b)),
            _ => a.cmp(b),
        },
        ColumnType::Int64 | ColumnType::Timestamp => match (<[u8; 8]>::try_from(a), <[u8; 8]>::try_from(b)) {
            (Ok(a), Ok(b)) => i64::from_be_bytes(a).cmp(&i64::from_be_bytes(b)),
            _ => a.cmp(b),
        },
        ColumnType::Float32 => match (<[u8; 4]>::try_from(a), <[u8; 4]>::try_from(b)) {
            (Ok(a), Ok(b)) => {
                let ord = compare_f32_nan_smallest(f32::from_be_bytes(a), f32::from_be_bytes(b));
                if ord == Ordering::Equal { a.as_slice().cmp(b.as_slice()) } else { ord }
            }
            _ => a.cmp(b),
        },
    }
}

fn compare_f32_nan_smallest(a: f32, b: f32) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::partition_key_bytes;
    use tempfile::TempDir;

    fn int_pk_schema() -> TableSchema {
        TableSchema::new(
            vec![ColumnDef::new("id", ColumnType::Int32), ColumnDef::new("name", ColumnType::Text)],
            0,
        )
        .unwrap()
    }

    fn open_fresh(dir: &TempDir, settings: TableSettings) -> Arc<Table> {
        Table::open_or_create(
            dir.path().join("t-uuid"),
            "k",
            "t",
            "uuid",
            Some(int_pk_schema()),
            settings,
            true,
        )
        .unwrap()
    }

    fn pk(id: i32) -> Vec<u8> {
        partition_key_bytes(ColumnType::Int32, &crate::schema::SqlLiteral::number(id.to_string())).unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
        assert_eq!(table.get_row(&pk(1)).unwrap(), Some(b"row-1".to_vec()));
        assert_eq!(table.get_row(&pk(2)).unwrap(), None);
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
        table.delete_row(&pk(1)).unwrap();
        assert_eq!(table.get_row(&pk(1)).unwrap(), None);
    }

    #[test]
    fn flush_then_get_still_finds_row() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
        table.flush().unwrap();
        assert_eq!(table.get_row(&pk(1)).unwrap(), Some(b"row-1".to_vec()));
        assert_eq!(table.memtable_bytes(), 0);
    }

    #[test]
    fn tombstone_survives_flush() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
        table.flush().unwrap();
        table.delete_row(&pk(1)).unwrap();
        table.flush().unwrap();
        assert_eq!(table.get_row(&pk(1)).unwrap(), None);
    }

    #[test]
    fn empty_memtable_flush_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        table.flush().unwrap();
        let inner = table.inner.lock().unwrap();
        assert!(inner.manifest.sstable_files.is_empty());
    }

    #[test]
    fn scan_all_rows_sorts_ascending_and_descending_by_int_pk() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        for id in [3, 1, 2] {
            table.put_row(&pk(id), format!("row-{id}").into_bytes()).unwrap();
        }
        let asc = table.scan_all_rows_by_pk(false).unwrap();
        let asc_ids: Vec<i32> = asc.iter().map(|(pk, _)| i32::from_be_bytes(pk[..4].try_into().unwrap())).collect();
        assert_eq!(asc_ids, vec![1, 2, 3]);

        let desc = table.scan_all_rows_by_pk(true).unwrap();
        let desc_ids: Vec<i32> = desc.iter().map(|(pk, _)| i32::from_be_bytes(pk[..4].try_into().unwrap())).collect();
        assert_eq!(desc_ids, vec![3, 2, 1]);
    }

    #[test]
    fn scan_all_rows_merges_memtable_and_sstable_keeping_newest() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        table.put_row(&pk(1), b"old".to_vec()).unwrap();
        table.flush().unwrap();
        table.put_row(&pk(1), b"new".to_vec()).unwrap();
        let rows = table.scan_all_rows_by_pk(false).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, b"new");
    }

    #[test]
    fn reopen_after_shutdown_recovers_uncommitted_writes() {
        let dir = TempDir::new().unwrap();
        let table_dir = dir.path().join("t-uuid");
        {
            let table = Table::open_or_create(table_dir.clone(), "k", "t", "uuid", Some(int_pk_schema()), TableSettings::default(), true).unwrap();
            table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
            table.shutdown().unwrap();
        }
        let table = Table::open_or_create(table_dir, "k", "t", "uuid", None, TableSettings::default(), false).unwrap();
        assert_eq!(table.get_row(&pk(1)).unwrap(), Some(b"row-1".to_vec()));
    }

    #[test]
    fn wal_tail_corruption_drops_only_the_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let table_dir = dir.path().join("t-uuid");
        {
            let table = Table::open_or_create(table_dir.clone(), "k", "t", "uuid", Some(int_pk_schema()), TableSettings::default(), true).unwrap();
            table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
            table.put_row(&pk(2), b"row-2".to_vec()).unwrap();
            table.put_row(&pk(3), b"row-3".to_vec()).unwrap();
        }
        let commitlog = table_dir.join("commitlog.bin");
        let len = fs::metadata(&commitlog).unwrap().len();
        let file = fs::OpenOptions::new().write(true).open(&commitlog).unwrap();
        file.set_len(len - 5).unwrap();

        let table = Table::open_or_create(table_dir, "k", "t", "uuid", None, TableSettings::default(), false).unwrap();
        assert_eq!(table.get_row(&pk(1)).unwrap(), Some(b"row-1".to_vec()));
        assert_eq!(table.get_row(&pk(2)).unwrap(), Some(b"row-2".to_vec()));
        assert_eq!(table.get_row(&pk(3)).unwrap(), None);

        // Recovery must rewrite the log itself, not just skip the corrupt
        // tail in memory, or a second restart would replay from the
        // still-corrupt bytes left on disk.
        let records = wal::read_records(&commitlog).unwrap();
        assert_eq!(records.len(), 2);
        table.put_row(&pk(4), b"row-4".to_vec()).unwrap();
        table.shutdown().unwrap();
        let reopened = Table::open_or_create(dir.path().join("t-uuid"), "k", "t", "uuid", None, TableSettings::default(), false).unwrap();
        assert_eq!(reopened.get_row(&pk(4)).unwrap(), Some(b"row-4".to_vec()));
    }

    #[test]
    fn truncate_resets_table_to_empty() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings::default());
        table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
        table.flush().unwrap();
        table.truncate().unwrap();
        assert_eq!(table.get_row(&pk(1)).unwrap(), None);
        let inner = table.inner.lock().unwrap();
        assert!(inner.manifest.sstable_files.is_empty());
        assert_eq!(inner.next_seq, 1);
    }

    #[test]
    fn zero_stride_setting_is_normalized() {
        let settings = TableSettings { sstable_index_stride: 0, ..TableSettings::default() }.normalized();
        assert_eq!(settings.sstable_index_stride, sstable::DEFAULT_INDEX_STRIDE);
    }

    #[test]
    fn compare_pk_typed_handles_every_column_type() {
        use std::cmp::Ordering;
        assert_eq!(compare_pk_typed(ColumnType::Int32, &1i32.to_be_bytes(), &2i32.to_be_bytes()), Ordering::Less);
        assert_eq!(compare_pk_typed(ColumnType::Text, b"a", b"b"), Ordering::Less);
        assert_eq!(compare_pk_typed(ColumnType::Boolean, &[0], &[1]), Ordering::Less);
        assert_eq!(
            compare_pk_typed(ColumnType::Float32, &f32::NAN.to_be_bytes(), &0.0f32.to_be_bytes()),
            Ordering::Less
        );
    }

    #[test]
    fn always_fsync_policy_leaves_wal_clean_after_every_write() {
        let dir = TempDir::new().unwrap();
        let table = open_fresh(&dir, TableSettings { wal_fsync: WalFsyncPolicy::Always, ..TableSettings::default() });
        table.put_row(&pk(1), b"row-1".to_vec()).unwrap();
        let inner = table.inner.lock().unwrap();
        assert!(!inner.wal.is_dirty());
    }
}
