use std::time::{Duration, SystemTime};

use arcrosse_persist::{run_housekeeping, PersistConfig};
use tempfile::tempdir;

/// Write a cache file of `len` bytes whose mtime is `age` before now.
fn aged_cache_file(dir: &std::path::Path, name: &str, len: usize, age: Duration) {
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; len]).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

fn config(dir: &std::path::Path, cap: u64) -> PersistConfig {
    PersistConfig {
        cache_dir: dir.to_path_buf(),
        max_total_bytes: cap,
        ..PersistConfig::default()
    }
}

#[test]
fn over_cap_directory_is_pruned_oldest_first() {
    let dir = tempdir().unwrap();

    // Ten 200-byte files, each a minute older than the next; 2000 bytes
    // total against a 1000-byte cap.
    for i in 0..10 {
        aged_cache_file(
            dir.path(),
            &format!("bin{i}.cache"),
            200,
            Duration::from_secs(60 * (10 - i)),
        );
    }

    let report = run_housekeeping(&config(dir.path(), 1000)).unwrap();

    assert_eq!(report.total_bytes_before, 2000);
    assert!(report.total_bytes_after <= 800);
    assert_eq!(report.files_removed, 6);

    // The oldest files are bin0..bin5; the newest four survive.
    for i in 0..6 {
        assert!(!dir.path().join(format!("bin{i}.cache")).exists());
    }
    for i in 6..10 {
        assert!(dir.path().join(format!("bin{i}.cache")).exists());
    }
}

#[test]
fn under_cap_directory_is_untouched() {
    let dir = tempdir().unwrap();
    for i in 0..3 {
        aged_cache_file(dir.path(), &format!("b{i}.cache"), 100, Duration::from_secs(i));
    }

    let report = run_housekeeping(&config(dir.path(), 1000)).unwrap();
    assert_eq!(report.files_removed, 0);
    assert_eq!(report.total_bytes_after, 300);
    for i in 0..3 {
        assert!(dir.path().join(format!("b{i}.cache")).exists());
    }
}

#[test]
fn non_cache_files_are_ignored() {
    let dir = tempdir().unwrap();
    aged_cache_file(dir.path(), "big.cache", 500, Duration::from_secs(60));
    std::fs::write(dir.path().join("signatures.db"), vec![0u8; 4096]).unwrap();

    let report = run_housekeeping(&config(dir.path(), 1000)).unwrap();

    // The .db file neither counts toward the total nor gets deleted.
    assert_eq!(report.total_bytes_before, 500);
    assert_eq!(report.files_removed, 0);
    assert!(dir.path().join("signatures.db").exists());
}
