use super::*;

#[test]
fn put_then_get_round_trips() {
    let mut mt = Memtable::new();
    mt.put(b"k1".to_vec(), 1, b"v1".to_vec());
    let v = mt.get(b"k1").unwrap();
    assert_eq!(v.seq, 1);
    assert_eq!(v.value, b"v1");
}

#[test]
fn missing_key_is_none() {
    let mt = Memtable::new();
    assert!(mt.get(b"nope").is_none());
}

#[test]
fn overwrite_replaces_value_and_updates_bytes() {
    let mut mt = Memtable::new();
    mt.put(b"k1".to_vec(), 1, b"v1".to_vec());
    let bytes_after_first = mt.bytes();
    mt.put(b"k1".to_vec(), 2, b"much-longer-value".to_vec());
    assert_eq!(mt.len(), 1);
    assert_eq!(mt.get(b"k1").unwrap().seq, 2);
    assert_eq!(mt.get(b"k1").unwrap().value, b"much-longer-value");
    assert_ne!(mt.bytes(), bytes_after_first);
}

#[test]
fn remove_if_seq_only_removes_matching_seq() {
    let mut mt = Memtable::new();
    mt.put(b"k1".to_vec(), 1, b"v1".to_vec());
    // A concurrent write bumps the seq before the flush can retire it.
    mt.put(b"k1".to_vec(), 2, b"v2".to_vec());
    assert!(!mt.remove_if_seq(b"k1", 1));
    assert!(mt.get(b"k1").is_some());

    assert!(mt.remove_if_seq(b"k1", 2));
    assert!(mt.get(b"k1").is_none());
}

#[test]
fn remove_if_seq_on_absent_key_is_false() {
    let mut mt = Memtable::new();
    assert!(!mt.remove_if_seq(b"nope", 1));
}

#[test]
fn snapshot_reflects_all_live_entries() {
    let mut mt = Memtable::new();
    mt.put(b"a".to_vec(), 1, b"1".to_vec());
    mt.put(b"b".to_vec(), 2, b"2".to_vec());
    let mut snap = mt.snapshot();
    snap.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(snap.len(), 2);
    assert_eq!(snap[0].0, b"a");
    assert_eq!(snap[1].0, b"b");
}

#[test]
fn clear_empties_the_map_and_resets_bytes() {
    let mut mt = Memtable::new();
    mt.put(b"a".to_vec(), 1, b"1".to_vec());
    mt.clear();
    assert!(mt.is_empty());
    assert_eq!(mt.bytes(), 0);
    assert_eq!(mt.len(), 0);
}

#[test]
fn empty_value_is_stored_like_any_other_value() {
    let mut mt = Memtable::new();
    mt.put(b"tombstoned".to_vec(), 1, Vec::new());
    let v = mt.get(b"tombstoned").unwrap();
    assert!(v.value.is_empty());
}
