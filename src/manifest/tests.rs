use super::*;
use tempfile::TempDir;

#[test]
fn missing_file_reads_as_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.bin");
    assert_eq!(read_manifest(&path), Manifest::default());
}

#[test]
fn write_then_read_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.bin");
    let m = Manifest {
        last_flushed_seq: 42,
        next_sstable_gen: 3,
        sstable_files: vec!["sstable-000001.bin".to_string(), "sstable-000002.bin".to_string()],
    };
    write_manifest_atomic(&path, &m).unwrap();
    assert_eq!(read_manifest(&path), m);
}

#[test]
fn garbage_file_reads_as_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.bin");
    std::fs::write(&path, b"not a manifest").unwrap();
    assert_eq!(read_manifest(&path), Manifest::default());
}

#[test]
fn version_mismatch_reads_as_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.bin");
    let mut buf = Vec::new();
    codec::put_magic(&mut buf, MANIFEST_MAGIC);
    999u32.encode_to(&mut buf).unwrap();
    std::fs::write(&path, &buf).unwrap();
    assert_eq!(read_manifest(&path), Manifest::default());
}

#[test]
fn rewrite_does_not_leave_temp_file_behind() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manifest.bin");
    write_manifest_atomic(&path, &Manifest::default()).unwrap();
    write_manifest_atomic(&path, &Manifest { last_flushed_seq: 1, ..Manifest::default() }).unwrap();
    assert!(!path.with_extension("tmp").exists());
    assert!(path.exists());
}
