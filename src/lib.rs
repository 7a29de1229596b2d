//! # latticedb
//!
//! A single-node, keyspace/table oriented persistent store. Data lives
//! under **keyspaces** (plain directories) that hold **tables**
//! (directories named `<table>-<uuid>`); each table is an independent
//! **LSM-tree** storage engine built from the same four pieces every
//! table in the system shares:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Table                               │
//! │  ┌────────────┐   ┌──────────────┐   ┌───────────────────┐ │
//! │  │  Memtable   │   │  WAL         │   │  SSTables          │ │
//! │  │  (RAM)      │◄──┤ commitlog.bin│   │  sstable-NNNNNN.bin│ │
//! │  └──────┬──────┘   └──────────────┘   └─────────┬──────────┘ │
//! │         │ flush (sorted, atomic rename)          │           │
//! │         └───────────────────────────────────────►│           │
//! │                                                   │           │
//! │  ┌────────────────────────────────────────────────┘          │
//! │  │              Manifest (manifest.bin)                      │
//! │  └─────────────────────────────────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`] | Big-endian binary primitives and the CRC32 used by every on-disk record |
//! | [`encoding`] | Native-endian `Encode`/`Decode` traits for the host-local schema/metadata/manifest files |
//! | [`tokenizer`] | Murmur3-x64-128 key tokenization and decorated-key construction |
//! | [`schema`] | Column types, SQL literals, and the row codec (typed literals ⇄ row bytes ⇄ JSON) |
//! | [`wal`] | Append-only, CRC-protected write-ahead log |
//! | [`memtable`] | Latest-wins in-memory map keyed by decorated key |
//! | [`sstable`] | Immutable sorted on-disk table with a sparse index |
//! | [`manifest`] | Atomically-rewritten pointer to a table's SSTable set |
//! | [`table`] | Per-table engine: orchestrates the WAL, memtable, SSTables, and manifest |
//! | [`keyspace`] | Per-keyspace `schema.bin` mapping table names to UUIDs |
//! | [`engine`] | Façade: keyspace/table lifecycle and the open-table cache |
//!
//! ## Scope
//!
//! This crate is the storage core only. It does not speak the SQL-like
//! line protocol, does not open a TCP listener, and does not load
//! configuration files — those are the job of an embedding binary. What
//! it exposes is a typed Rust API (see [`engine::Engine`]) that such a
//! binary, or any other embedder, drives directly.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use latticedb::engine::Engine;
//! use latticedb::schema::{ColumnDef, ColumnType, TableSchema};
//!
//! let engine = Engine::open("/tmp/latticedb-demo").unwrap();
//! engine.create_keyspace("k").unwrap();
//!
//! let schema = TableSchema::new(
//!     vec![
//!         ColumnDef::new("id", ColumnType::Int32),
//!         ColumnDef::new("name", ColumnType::Text),
//!     ],
//!     0,
//! ).unwrap();
//! engine.create_table("k", "t", schema, false).unwrap();
//!
//! let table = engine.open_table("k", "t").unwrap();
//! table.shutdown().unwrap();
//! ```

#![allow(dead_code)]

pub mod codec;
pub mod encoding;
pub mod engine;
pub mod keyspace;
pub mod manifest;
pub mod memtable;
pub mod schema;
pub mod sstable;
pub mod table;
pub mod tokenizer;
pub mod wal;
