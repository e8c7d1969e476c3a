use arcrosse_signatures::{identify_patterns, BlockKind, MIN_PATTERN_LEN};

fn shared_run() -> Vec<u8> {
    (0..MIN_PATTERN_LEN as u8).map(|i| i.wrapping_mul(7)).collect()
}

#[test]
fn sequence_in_three_blocks_becomes_a_pattern() {
    let run = shared_run();

    // Three blocks embed the same 16-byte run at different offsets; the
    // blocks are long enough that the run fits in the half-length bound.
    let mut blocks = Vec::new();
    for pad in [0usize, 3, 6] {
        let mut block = vec![0xCCu8; pad];
        block.extend_from_slice(&run);
        block.resize(run.len() * 2 + pad, 0x90);
        blocks.push(block);
    }
    let bases = vec![0x1000, 0x2000, 0x3000];

    let patterns = identify_patterns(&blocks, &bases);
    assert!(!patterns.is_empty());
    assert!(patterns.iter().all(|p| p.kind == BlockKind::Generic));
    assert!(patterns.iter().all(|p| p.len >= MIN_PATTERN_LEN));
    assert!(patterns.iter().all(|p| p.is_well_formed()));
    assert!(patterns
        .iter()
        .any(|p| p.reference == run));
}

#[test]
fn sequence_in_two_blocks_is_not_enough() {
    let run = shared_run();
    let mut blocks = Vec::new();
    for _ in 0..2 {
        let mut block = run.clone();
        block.resize(run.len() * 2, 0x90);
        blocks.push(block);
    }
    // A third block without the run.
    blocks.push(vec![0x11u8; run.len() * 2]);
    let bases = vec![0, 0x100, 0x200];

    let patterns = identify_patterns(&blocks, &bases);
    assert!(patterns.iter().all(|p| p.reference != run));
}

#[test]
fn short_blocks_yield_no_patterns() {
    let blocks = vec![vec![0xAAu8; MIN_PATTERN_LEN]; 3];
    let bases = vec![0, 1, 2];
    // Pattern length is bounded by half the block length; 16-byte blocks
    // cannot host a 16-byte pattern.
    assert!(identify_patterns(&blocks, &bases).is_empty());
}
