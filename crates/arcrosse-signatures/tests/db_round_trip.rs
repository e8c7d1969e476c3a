use arcrosse_signatures::{BlockKind, BlockSignature, SignatureStore};
use tempfile::tempdir;

fn sample_store() -> SignatureStore {
    let mut store = SignatureStore::new();
    store.insert(BlockSignature::from_reference(
        &[0x55, 0x48, 0x89, 0xE5, 0xC3],
        BlockKind::Function,
        0x1000,
        vec![1, 1, 1, 1, 1],
        0.85,
    ));
    store.insert(BlockSignature::from_reference(
        &[0xFF, 0xC8, 0x75, 0xFE],
        BlockKind::Loop,
        0x2000,
        vec![1, 1, 1, 0],
        0.9,
    ));
    store
}

#[test]
fn save_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("signatures.db");

    let store = sample_store();
    store.save(&path).unwrap();

    let mut reloaded = SignatureStore::new();
    assert_eq!(reloaded.load(&path).unwrap(), 2);
    assert_eq!(reloaded.len(), 2);

    // Exact lookup works against loaded entries.
    let hit = reloaded.find(&[0x55, 0x48, 0x89, 0xE5, 0xC3]).unwrap();
    assert_eq!(hit.kind, BlockKind::Function);
    assert_eq!(hit.address, 0x1000);
    assert_eq!(hit.mask, vec![1, 1, 1, 1, 1]);
    assert!((hit.threshold - 0.85).abs() < f32::EPSILON);
}

#[test]
fn loaded_signatures_do_not_fuzzy_match() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("signatures.db");
    sample_store().save(&path).unwrap();

    let mut reloaded = SignatureStore::new();
    reloaded.load(&path).unwrap();

    // One masked-out byte differs: an in-memory store would fuzzy-match,
    // but the database carries no reference bytes to compare against.
    assert!(reloaded.find(&[0xFF, 0xC8, 0x75, 0x00]).is_none());
}

#[test]
fn truncated_database_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("signatures.db");
    sample_store().save(&path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 3);
    std::fs::write(&path, &bytes).unwrap();

    let mut reloaded = SignatureStore::new();
    assert!(reloaded.load(&path).is_err());
}

#[test]
fn kind_counts_reflect_contents() {
    let store = sample_store();
    let counts = store.kind_counts();
    assert_eq!(counts.function, 1);
    assert_eq!(counts.loops, 1);
    assert_eq!(counts.simd, 0);
}
