use super::*;
use crate::schema::{column_type_from_name, partition_key_bytes, row_bytes, row_to_json_mapped, ColumnDef, SqlLiteral};
use tempfile::TempDir;

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

fn pk_for(id: i32) -> Vec<u8> {
    partition_key_bytes(column_type_from_name("int").unwrap(), &SqlLiteral::number(id.to_string())).unwrap()
}

#[test]
fn create_keyspace_then_create_table_then_round_trip() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();

    let table = engine.open_table("k", "t").unwrap();
    let schema = table.schema();
    let row = row_bytes(
        &schema,
        &["id".to_string(), "name".to_string()],
        &[SqlLiteral::number("1"), SqlLiteral::quoted("a")],
    )
    .unwrap();
    table.put_row(&pk_for(1), row).unwrap();

    let found = table.get_row(&pk_for(1)).unwrap().unwrap();
    let json = row_to_json_mapped(&schema, &pk_for(1), &found, &[("id".to_string(), "id".to_string()), ("name".to_string(), "name".to_string())]).unwrap();
    assert_eq!(json["id"], serde_json::json!(1));
    assert_eq!(json["name"], serde_json::json!("a"));
}

#[test]
fn create_table_twice_without_if_not_exists_fails() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();
    let err = engine.create_table("k", "t", int_text_schema(), false).unwrap_err();
    assert_eq!(err.kind(), "table_exists");
}

#[test]
fn create_table_with_if_not_exists_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();
    engine.create_table("k", "t", int_text_schema(), true).unwrap();
}

#[test]
fn create_table_with_if_not_exists_rejects_a_different_schema() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();

    let other_schema = TableSchema::new(vec![ColumnDef::new("id", column_type_from_name("int").unwrap())], 0).unwrap();
    let err = engine.create_table("k", "t", other_schema, true).unwrap_err();
    assert_eq!(err.kind(), "schema_mismatch");
}

#[test]
fn open_unknown_table_fails_not_found() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    let err = engine.open_table("k", "missing").unwrap_err();
    assert_eq!(err.kind(), "table_not_found");
}

#[test]
fn scan_order_with_explicit_desc() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();
    let table = engine.open_table("k", "t").unwrap();
    let schema = table.schema();
    for id in [3, 1, 2] {
        let row = row_bytes(&schema, &["id".to_string(), "name".to_string()], &[SqlLiteral::number(id.to_string()), SqlLiteral::quoted("x")]).unwrap();
        table.put_row(&pk_for(id), row).unwrap();
    }
    let rows = table.scan_all_rows_by_pk(true).unwrap();
    let ids: Vec<i32> = rows.iter().map(|(pk, _)| i32::from_be_bytes(pk[..4].try_into().unwrap())).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[test]
fn tombstone_survives_flush_through_the_facade() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();
    let table = engine.open_table("k", "t").unwrap();
    let schema = table.schema();
    let row = row_bytes(&schema, &["id".to_string(), "name".to_string()], &[SqlLiteral::number("1"), SqlLiteral::quoted("a")]).unwrap();
    table.put_row(&pk_for(1), row).unwrap();
    table.flush().unwrap();
    table.delete_row(&pk_for(1)).unwrap();
    table.flush().unwrap();
    assert_eq!(table.get_row(&pk_for(1)).unwrap(), None);
}

#[test]
fn drop_table_with_if_exists_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();
    engine.drop_table("k", "t", false).unwrap();
    engine.drop_table("k", "t", true).unwrap();
    let err = engine.drop_table("k", "t", false).unwrap_err();
    assert_eq!(err.kind(), "table_not_found");
}

#[test]
fn drop_table_evicts_cache_and_removes_directory() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    let table_path = engine.create_table("k", "t", int_text_schema(), false).unwrap();
    assert!(table_path.exists());
    engine.drop_table("k", "t", false).unwrap();
    assert!(!table_path.exists());
}

#[test]
fn drop_keyspace_removes_every_table_under_it() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t1", int_text_schema(), false).unwrap();
    engine.create_table("k", "t2", int_text_schema(), false).unwrap();
    let keyspace_path = dir.path().join("k");
    engine.drop_keyspace("k", false).unwrap();
    assert!(!keyspace_path.exists());
}

#[test]
fn drop_keyspace_with_if_exists_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.drop_keyspace("nope", true).unwrap();
    let err = engine.drop_keyspace("nope", false).unwrap_err();
    assert_eq!(err.kind(), "keyspace_not_found");
}

#[test]
fn list_keyspaces_and_tables_are_sorted() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("z").unwrap();
    engine.create_keyspace("a").unwrap();
    assert_eq!(engine.list_keyspaces().unwrap(), vec!["a".to_string(), "z".to_string()]);

    engine.create_table("a", "zeta", int_text_schema(), false).unwrap();
    engine.create_table("a", "alpha", int_text_schema(), false).unwrap();
    assert_eq!(engine.list_tables("a").unwrap(), vec!["alpha".to_string(), "zeta".to_string()]);
}

#[test]
fn recovery_across_engine_restart() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(dir.path()).unwrap();
        engine.create_keyspace("k").unwrap();
        engine.create_table("k", "t", int_text_schema(), false).unwrap();
        let table = engine.open_table("k", "t").unwrap();
        let schema = table.schema();
        let row = row_bytes(&schema, &["id".to_string(), "name".to_string()], &[SqlLiteral::number("1"), SqlLiteral::quoted("a")]).unwrap();
        table.put_row(&pk_for(1), row).unwrap();
        table.shutdown().unwrap();
    }

    let engine = Engine::open(dir.path()).unwrap();
    let table = engine.open_table("k", "t").unwrap();
    assert!(table.get_row(&pk_for(1)).unwrap().is_some());
}

#[test]
fn open_table_recovers_uuid_by_directory_scan_when_schema_is_missing() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    engine.create_keyspace("k").unwrap();
    engine.create_table("k", "t", int_text_schema(), false).unwrap();

    // Simulate a keyspace schema.bin that forgot about this table.
    let schema_path = dir.path().join("k").join("schema.bin");
    std::fs::remove_file(&schema_path).unwrap();

    let second_engine = Engine::open(dir.path()).unwrap();
    let table = second_engine.open_table("k", "t").unwrap();
    assert_eq!(table.name(), "t");
    // The scan should have re-registered the table.
    assert!(keyspace::find_table_uuid_from_schema(&schema_path, "t").is_some());
}

#[test]
fn invalid_identifiers_are_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    let err = engine.create_keyspace("1bad").unwrap_err();
    assert_eq!(err.kind(), "bad_row");
}
