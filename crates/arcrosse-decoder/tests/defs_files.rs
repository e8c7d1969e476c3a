use arcrosse_decoder::{GuestDefs, GuestInstDef, GUEST_DEFS_FILE};
use tempfile::tempdir;

#[test]
fn missing_file_seeds_defaults_and_writes_them_out() {
    let dir = tempdir().unwrap();
    let defs = GuestDefs::load_or_seed(dir.path());

    assert!(!defs.is_empty());
    assert!(dir.path().join(GUEST_DEFS_FILE).is_file());

    // A second load reads the file that was just written.
    let reloaded = GuestDefs::load(&dir.path().join(GUEST_DEFS_FILE)).unwrap();
    assert_eq!(reloaded.len(), defs.len());
    assert_eq!(reloaded.get(0x89), defs.get(0x89));
}

#[test]
fn save_load_round_trip_preserves_definitions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(GUEST_DEFS_FILE);

    let mut defs = GuestDefs::seeded();
    defs.insert(GuestInstDef {
        opcode: 0xEB,
        mnemonic: "JMP_SHORT".to_owned(),
        length: 2,
        has_modrm: false,
        has_sib: false,
        has_displacement: false,
        has_immediate: false,
    });
    defs.save(&path).unwrap();

    let reloaded = GuestDefs::load(&path).unwrap();
    assert_eq!(reloaded.len(), defs.len());
    assert_eq!(reloaded.get(0xEB).unwrap().mnemonic, "JMP_SHORT");
}

#[test]
fn comments_and_malformed_lines_are_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(GUEST_DEFS_FILE);
    std::fs::write(
        &path,
        "# comment line\n\
         0x90 NOP 1 0 0 0 0\n\
         not-a-line\n\
         0x89 MOV 2 1 1 1 0\n",
    )
    .unwrap();

    let defs = GuestDefs::load(&path).unwrap();
    assert_eq!(defs.len(), 2);
    assert!(defs.get(0x90).is_some());
    assert!(defs.get(0x89).is_some());
}
