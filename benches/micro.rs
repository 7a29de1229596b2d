//! Micro-benchmarks for the per-table LSM engine.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- put       # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use latticedb::schema::{column_type_from_name, partition_key_bytes, row_bytes, ColumnDef, TableSchema, SqlLiteral};
use latticedb::table::{Table, TableSettings, WalFsyncPolicy};
use std::sync::Arc;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn int_text_schema() -> TableSchema {
    TableSchema::new(
        vec![
            ColumnDef::new("id", column_type_from_name("int").unwrap()),
            ColumnDef::new("name", column_type_from_name("text").unwrap()),
        ],
        0,
    )
    .unwrap()
}

fn pk(id: i64) -> Vec<u8> {
    partition_key_bytes(column_type_from_name("int").unwrap(), &SqlLiteral::number(id.to_string())).unwrap()
}

fn encoded_row(schema: &TableSchema, id: i64, value: &str) -> Vec<u8> {
    row_bytes(schema, &["id".to_string(), "name".to_string()], &[SqlLiteral::number(id.to_string()), SqlLiteral::quoted(value)]).unwrap()
}

/// Opens a table that never fsyncs on its own, so steady-state write
/// cost reflects the WAL append + memtable insert path only.
fn open_disabled_fsync(dir: &std::path::Path) -> Arc<Table> {
    let settings = TableSettings { wal_fsync: WalFsyncPolicy::Disabled, ..TableSettings::default() };
    Table::open_or_create(dir.to_path_buf(), "bench", "t", "bench-uuid", Some(int_text_schema()), settings, true).unwrap()
}

/// Opens a table that fsyncs after every write.
fn open_always_fsync(dir: &std::path::Path) -> Arc<Table> {
    let settings = TableSettings { wal_fsync: WalFsyncPolicy::Always, ..TableSettings::default() };
    Table::open_or_create(dir.to_path_buf(), "bench", "t", "bench-uuid", Some(int_text_schema()), settings, true).unwrap()
}

/// Writes `count` sequential rows, flushes to SSTable, and reopens so
/// reads exercise the on-disk path with an empty memtable.
fn prepopulate_and_reopen(dir: &std::path::Path, count: i64) -> Arc<Table> {
    let table = open_disabled_fsync(dir);
    let schema = table.schema();
    for i in 0..count {
        table.put_row(&pk(i), encoded_row(&schema, i, "v")).unwrap();
    }
    table.flush().unwrap();
    table.shutdown().unwrap();
    Table::open_or_create(dir.to_path_buf(), "bench", "t", "bench-uuid", None, TableSettings::default(), false).unwrap()
}

// ================================================================================================
// Write benchmarks
// ================================================================================================

/// `put_row` latency under the two fsync extremes.
///
/// `always` fsyncs the WAL after every write and measures the durable
/// write path in isolation. `disabled` never fsyncs on its own and
/// measures the WAL-append + memtable-insert cost without I/O stalls.
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    group.bench_function("disabled_fsync", |b| {
        let dir = TempDir::new().unwrap();
        let table = open_disabled_fsync(dir.path());
        let schema = table.schema();
        let mut seq = 0i64;
        b.iter(|| {
            table.put_row(black_box(&pk(seq)), black_box(encoded_row(&schema, seq, "v"))).unwrap();
            seq += 1;
        });
    });

    group.bench_function("always_fsync", |b| {
        let dir = TempDir::new().unwrap();
        let table = open_always_fsync(dir.path());
        let schema = table.schema();
        let mut seq = 0i64;
        b.iter(|| {
            table.put_row(black_box(&pk(seq)), black_box(encoded_row(&schema, seq, "v"))).unwrap();
            seq += 1;
        });
    });

    group.finish();
}

// ================================================================================================
// Read benchmarks
// ================================================================================================

/// `get_row` latency from the memtable versus from a flushed SSTable.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let n = 10_000i64;

    {
        let dir = TempDir::new().unwrap();
        let table = open_disabled_fsync(dir.path());
        let schema = table.schema();
        for i in 0..n {
            table.put_row(&pk(i), encoded_row(&schema, i, "v")).unwrap();
        }

        group.bench_function("memtable_hit", |b| {
            let mut i = 0i64;
            b.iter(|| {
                let _ = black_box(table.get_row(black_box(&pk(i % n))).unwrap());
                i += 1;
            });
        });

        group.bench_function("memtable_miss", |b| {
            let mut i = 0i64;
            b.iter(|| {
                let _ = black_box(table.get_row(black_box(&pk(n + i))).unwrap());
                i += 1;
            });
        });
    }

    {
        let dir = TempDir::new().unwrap();
        let table = prepopulate_and_reopen(dir.path(), 5_000);

        group.bench_function("sstable_hit", |b| {
            let mut i = 0i64;
            b.iter(|| {
                let _ = black_box(table.get_row(black_box(&pk(i % 5_000))).unwrap());
                i += 1;
            });
        });

        group.bench_function("sstable_miss", |b| {
            let mut i = 0i64;
            b.iter(|| {
                let _ = black_box(table.get_row(black_box(&pk(5_000 + i))).unwrap());
                i += 1;
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Flush benchmark
// ================================================================================================

/// `flush` latency as a function of memtable size.
fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");
    group.sample_size(10);

    for &count in &[1_000i64, 10_000] {
        group.bench_function(BenchmarkId::new("rows", count), |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let table = open_disabled_fsync(dir.path());
                    let schema = table.schema();
                    for i in 0..count {
                        table.put_row(&pk(i), encoded_row(&schema, i, "v")).unwrap();
                    }
                    (dir, table)
                },
                |(_dir, table)| {
                    table.flush().unwrap();
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

// ================================================================================================
// Scan benchmarks
// ================================================================================================

/// `scan_all_rows_by_pk` over memtable-only versus flushed data.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.sample_size(10);

    {
        let dir = TempDir::new().unwrap();
        let table = open_disabled_fsync(dir.path());
        let schema = table.schema();
        for i in 0..5_000i64 {
            table.put_row(&pk(i), encoded_row(&schema, i, "v")).unwrap();
        }
        group.throughput(Throughput::Elements(5_000));
        group.bench_function("memtable_ascending", |b| {
            b.iter(|| {
                let rows = table.scan_all_rows_by_pk(false).unwrap();
                black_box(&rows);
            });
        });
    }

    {
        let dir = TempDir::new().unwrap();
        let table = prepopulate_and_reopen(dir.path(), 5_000);
        group.throughput(Throughput::Elements(5_000));
        group.bench_function("sstable_descending", |b| {
            b.iter(|| {
                let rows = table.scan_all_rows_by_pk(true).unwrap();
                black_box(&rows);
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Recovery benchmark
// ================================================================================================

/// Cold-open latency: WAL replay plus SSTable/manifest loading.
fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");
    group.sample_size(10);

    for &count in &[1_000i64, 10_000] {
        group.bench_function(BenchmarkId::new("open_existing", count), |b| {
            let dir = TempDir::new().unwrap();
            {
                let table = open_disabled_fsync(dir.path());
                let schema = table.schema();
                for i in 0..count {
                    table.put_row(&pk(i), encoded_row(&schema, i, "v")).unwrap();
                }
                table.flush().unwrap();
                table.shutdown().unwrap();
            }

            b.iter(|| {
                let table = Table::open_or_create(dir.path().to_path_buf(), "bench", "t", "bench-uuid", None, TableSettings::default(), false).unwrap();
                black_box(&table);
                table.shutdown().unwrap();
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Concurrent access benchmarks
// ================================================================================================

/// Read throughput under concurrent readers, and read latency while a
/// writer thread is active. `Table` serializes all access through one
/// mutex, so this also measures that lock's contention cost.
fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.sample_size(10);

    let reads_per_thread = 500i64;
    let n = 5_000i64;

    for &num_readers in &[1u32, 2, 4] {
        group.bench_function(BenchmarkId::new("readers", num_readers), |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let table = prepopulate_and_reopen(dir.path(), n);
                    (dir, table)
                },
                |(_dir, table)| {
                    let mut handles = Vec::new();
                    for t in 0..num_readers {
                        let table = Arc::clone(&table);
                        handles.push(std::thread::spawn(move || {
                            for i in 0..reads_per_thread {
                                let _ = black_box(table.get_row(&pk((i + t as i64 * 1000) % n)).unwrap());
                            }
                        }));
                    }
                    for h in handles {
                        h.join().unwrap();
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

// ================================================================================================
// Value-size scaling
// ================================================================================================

/// `put_row` latency as a function of encoded value size.
fn bench_value_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_size");

    for &size in &[8usize, 64, 256, 1024] {
        let value = "x".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("put", size), |b| {
            let dir = TempDir::new().unwrap();
            let table = open_disabled_fsync(dir.path());
            let schema = table.schema();
            let mut seq = 0i64;
            b.iter(|| {
                table.put_row(black_box(&pk(seq)), black_box(encoded_row(&schema, seq, &value))).unwrap();
                seq += 1;
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_flush,
    bench_scan,
    bench_recovery,
    bench_concurrent,
    bench_value_sizes,
);

criterion_main!(benches);
