use arcrosse_rules::{HostDefs, RuleSet, HOST_DEFS_FILE, TRANSLATION_RULES_FILE};
use tempfile::tempdir;

#[test]
fn missing_files_seed_defaults_and_write_them_out() {
    let dir = tempdir().unwrap();

    let rules = RuleSet::load_or_seed(dir.path());
    let defs = HostDefs::load_or_seed(dir.path());

    assert!(!rules.is_empty());
    assert!(!defs.is_empty());
    assert!(dir.path().join(TRANSLATION_RULES_FILE).is_file());
    assert!(dir.path().join(HOST_DEFS_FILE).is_file());
}

#[test]
fn seeded_rules_survive_a_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(TRANSLATION_RULES_FILE);

    RuleSet::seeded().save(&path).unwrap();
    let reloaded = RuleSet::load(&path).unwrap();
    assert_eq!(reloaded.len(), RuleSet::seeded().len());
}

#[test]
fn ill_formed_host_def_lines_are_dropped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(HOST_DEFS_FILE);
    // Second line violates encoding & mask == value.
    std::fs::write(
        &path,
        "0xD503201F NOP 0xFFFFFFFF 0xD503201F\n\
         0xAA0003E0 MOV 0xFFFFFFFF 0x00000000\n",
    )
    .unwrap();

    let defs = HostDefs::load(&path).unwrap();
    assert_eq!(defs.len(), 1);
    assert!(defs.get(0xD503_201F).is_some());
}
