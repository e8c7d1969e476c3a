use arcrosse_translator::{CpuState, Dispatcher, Translator, TranslatorConfig, TranslatorError};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// A single-block program: NOP through RET, with an untabled SIMD tail.
const EXAMPLE_PROGRAM: &[u8] = &[
    0x90, // NOP
    0x89, 0xC3, // MOV EBX, EAX
    0x01, 0xC3, // ADD EBX, EAX
    0x29, 0xD8, // SUB EAX, EBX
    0x0F, 0x28, 0xC1, // MOVAPS XMM0, XMM1
    0xC3, // RET
];
const ENTRY: u64 = 0x1000;

// NOP, MOV, ADD, SUB, SIMD prefix, 2 untabled bytes as NOPs, RET as two
// words: nine host words.
const EXAMPLE_HOST_WORDS: u32 = 9;

fn translator_in(dir: &TempDir) -> Translator {
    Translator::new(config_in(dir)).unwrap()
}

fn config_in(dir: &TempDir) -> TranslatorConfig {
    TranslatorConfig {
        cache_dir: dir.path().join("cache"),
        defs_dir: dir.path().to_path_buf(),
        stats_path: Some(dir.path().join("stats.json")),
        ..TranslatorConfig::default()
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    executed: Vec<Vec<u8>>,
}

impl Dispatcher for RecordingDispatcher {
    fn execute(&mut self, host_code: *const u8, host_len: usize, _state: &mut CpuState) {
        // Contract: the pointer is valid for host_len bytes for this call.
        let code = unsafe { std::slice::from_raw_parts(host_code, host_len) };
        self.executed.push(code.to_vec());
    }
}

#[test]
fn example_program_translates_to_expected_host_words() {
    let dir = TempDir::new().unwrap();
    let mut translator = translator_in(&dir);
    translator.load_binary(EXAMPLE_PROGRAM, ENTRY).unwrap();

    let record = translator
        .find_or_translate_block(ENTRY)
        .unwrap()
        .expect("block admitted");
    assert_eq!(record.guest_size as usize, EXAMPLE_PROGRAM.len());
    assert_eq!(record.host_size, EXAMPLE_HOST_WORDS * 4);

    // Same block again: tier-1 hit, identical record.
    let again = translator.find_or_translate_block(ENTRY).unwrap().unwrap();
    assert_eq!(again, record);

    // The host definition table was seeded alongside.
    assert!(translator.host_defs().get(0xD503_201F).is_some());
}

#[test]
fn run_dispatches_blocks_in_order() {
    let dir = TempDir::new().unwrap();
    let mut translator = translator_in(&dir);

    // Two blocks: CALL rel32, then NOP + RET.
    let program = [0xE8, 0x01, 0x00, 0x00, 0x00, 0x90, 0xC3];
    translator.load_binary(&program, ENTRY).unwrap();

    let mut dispatcher = RecordingDispatcher::default();
    translator
        .run(&mut dispatcher, ENTRY, program.len() as u64)
        .unwrap();

    assert_eq!(dispatcher.executed.len(), 2);
    // Block one is the CALL lowering: STR + BL.
    assert_eq!(
        dispatcher.executed[0],
        [0xF81F_0FE0u32, 0x9400_0000]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect::<Vec<u8>>()
    );
    // Block two: NOP plus the two-word RET lowering.
    assert_eq!(dispatcher.executed[1].len(), 12);

    let stats = translator.stats();
    assert_eq!(stats.execution_stats.blocks.total_blocks, 2);
    assert_eq!(stats.execution_stats.blocks.total_executions, 2);
}

#[test]
fn repeated_runs_make_blocks_hot() {
    let dir = TempDir::new().unwrap();
    let mut translator = translator_in(&dir);
    translator.load_binary(EXAMPLE_PROGRAM, ENTRY).unwrap();

    let mut dispatcher = RecordingDispatcher::default();
    for _ in 0..12 {
        translator
            .run(&mut dispatcher, ENTRY, EXAMPLE_PROGRAM.len() as u64)
            .unwrap();
    }

    let optimized = translator.optimize_hot_blocks();
    assert_eq!(optimized, vec![ENTRY]);

    let stats = translator.stats();
    assert_eq!(stats.execution_stats.blocks.hot_blocks, 1);
    assert_eq!(stats.top_blocks[0].address, ENTRY);
    assert_eq!(stats.top_blocks[0].executions, 12);
}

#[test]
fn translations_survive_into_a_new_translator() {
    let dir = TempDir::new().unwrap();
    {
        let mut translator = translator_in(&dir);
        translator.load_binary(EXAMPLE_PROGRAM, ENTRY).unwrap();
        translator.find_or_translate_block(ENTRY).unwrap().unwrap();
        translator.checkpoint().unwrap();
        translator.flush().unwrap();
        translator.shutdown().unwrap();
    }

    // Binary ids derive from the content fingerprint plus a per-facade
    // sequence, so reloading the same binary finds the same cache file.
    let mut translator = translator_in(&dir);
    translator.load_binary(EXAMPLE_PROGRAM, ENTRY).unwrap();
    let record = translator
        .find_or_translate_block(ENTRY)
        .unwrap()
        .expect("tier-2 promotion");
    assert_eq!(record.host_size, EXAMPLE_HOST_WORDS * 4);
    assert_eq!(translator.stats().execution_stats.cache.l2_hits, 1);
    assert_eq!(translator.stats().execution_stats.cache.misses, 0);
}

#[test]
fn oversize_binary_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut translator = Translator::new(TranslatorConfig {
        guest_arena_bytes: 8,
        ..config_in(&dir)
    })
    .unwrap();

    let err = translator.load_binary(&[0x90; 16], ENTRY).unwrap_err();
    assert!(matches!(
        err,
        TranslatorError::GuestArenaExhausted {
            needed: 16,
            capacity: 8
        }
    ));
}

#[test]
fn host_arena_exhaustion_refuses_the_block() {
    let dir = TempDir::new().unwrap();
    let mut translator = Translator::new(TranslatorConfig {
        host_arena_bytes: 8, // smaller than any full translation
        ..config_in(&dir)
    })
    .unwrap();
    translator.load_binary(EXAMPLE_PROGRAM, ENTRY).unwrap();

    assert!(translator.find_or_translate_block(ENTRY).unwrap().is_none());

    // The run loop halts instead of erroring.
    let mut dispatcher = RecordingDispatcher::default();
    translator
        .run(&mut dispatcher, ENTRY, EXAMPLE_PROGRAM.len() as u64)
        .unwrap();
    assert!(dispatcher.executed.is_empty());
}

#[test]
fn out_of_range_address_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut translator = translator_in(&dir);
    translator.load_binary(EXAMPLE_PROGRAM, ENTRY).unwrap();

    assert!(matches!(
        translator.find_or_translate_block(ENTRY - 1),
        Err(TranslatorError::AddressOutOfRange { .. })
    ));
    assert!(matches!(
        translator.find_or_translate_block(ENTRY + EXAMPLE_PROGRAM.len() as u64),
        Err(TranslatorError::AddressOutOfRange { .. })
    ));
}

#[test]
fn loading_derives_signatures_from_static_analysis() {
    let dir = TempDir::new().unwrap();
    let mut translator = translator_in(&dir);

    // A prologue-framed function followed by a count-down loop.
    let mut program = vec![0x55, 0x48, 0x89, 0xE5, 0x01, 0xC0, 0xC3];
    program.extend_from_slice(&[0xFF, 0xC8, 0x75, 0xFE]);
    translator.load_binary(&program, ENTRY).unwrap();

    let signatures = translator.stats().execution_stats.signatures;
    assert_eq!(signatures.function_signatures, 1);
    assert_eq!(signatures.loop_signatures, 1);
}

#[test]
fn shutdown_emits_stats_json_and_signature_db() {
    let dir = TempDir::new().unwrap();
    let stats_path = dir.path().join("stats.json");
    {
        let mut translator = translator_in(&dir);
        translator.load_binary(EXAMPLE_PROGRAM, ENTRY).unwrap();
        let mut dispatcher = RecordingDispatcher::default();
        translator
            .run(&mut dispatcher, ENTRY, EXAMPLE_PROGRAM.len() as u64)
            .unwrap();
        translator.shutdown().unwrap();
    }

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&stats_path).unwrap()).unwrap();
    assert!(json["binary_id"].as_str().unwrap().ends_with("_0"));
    assert!(json["execution_stats"]["blocks"]["total_executions"].as_u64().unwrap() >= 1);
    assert!(json["execution_stats"]["cache"].is_object());
    assert!(json["execution_stats"]["signatures"].is_object());
    assert!(json["top_blocks"].is_array());

    assert!(dir.path().join("cache").join("signatures.db").is_file());
    // Seeded definition files were written next to the stats.
    assert!(dir.path().join("x86_defs.txt").is_file());
    assert!(dir.path().join("arm_defs.txt").is_file());
    assert!(dir.path().join("translation_rules.txt").is_file());
}
