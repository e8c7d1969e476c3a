//! Static analysis of a guest binary image.
//!
//! Recognises two cheap shapes before any block is translated: function
//! prologues (`55 48 89 E5` push-rbp frames, extended to the first `C3`)
//! and short backward-jump count-down loops (`FF C8 75 <imm8 < 0>`).
//! Jump offsets inside a prologue body are masked out so relocated copies
//! of the same function still match.

use crate::store::{generate_mask, BlockKind, BlockSignature};

const PROLOGUE: [u8; 4] = [0x55, 0x48, 0x89, 0xE5];
const RET: u8 = 0xC3;
const MAX_FUNCTION_BYTES: usize = 10_000;

const FUNCTION_THRESHOLD: f32 = 0.85;
const LOOP_THRESHOLD: f32 = 0.9;

/// Derive signatures for every recognisable function and loop in `binary`.
///
/// `base_address` is the guest address of `binary[0]`; signature addresses
/// are absolute.
pub fn analyze(binary: &[u8], base_address: u64) -> Vec<BlockSignature> {
    let mut signatures = find_functions(binary, base_address);
    signatures.extend(find_loops(binary, base_address));
    signatures
}

fn find_functions(binary: &[u8], base_address: u64) -> Vec<BlockSignature> {
    let mut signatures = Vec::new();
    if binary.len() < PROLOGUE.len() {
        return signatures;
    }

    for start in 0..=binary.len() - PROLOGUE.len() {
        if binary[start..start + PROLOGUE.len()] != PROLOGUE {
            continue;
        }

        // Function body runs to the first RET, inclusive; when no RET
        // follows it runs to the end of the image.
        let mut end = start + PROLOGUE.len();
        while end < binary.len() {
            end += 1;
            if binary[end - 1] == RET {
                break;
            }
        }

        let len = end - start;
        if len >= MAX_FUNCTION_BYTES {
            continue;
        }

        let code = &binary[start..end];
        signatures.push(BlockSignature {
            mask: jump_offset_mask(code),
            ..BlockSignature::from_reference(
                code,
                BlockKind::Function,
                base_address + start as u64,
                Vec::new(),
                FUNCTION_THRESHOLD,
            )
        });
    }

    signatures
}

/// All-ones mask with the relocatable jump offsets zeroed: one byte after a
/// short conditional jump (`70..=7F`), four after `CALL`/`JMP` (`E8`/`E9`).
fn jump_offset_mask(code: &[u8]) -> Vec<u8> {
    let mut mask = vec![1u8; code.len()];
    for i in 0..code.len().saturating_sub(1) {
        let offset_bytes = match code[i] {
            0x70..=0x7F => 1,
            0xE8 | 0xE9 => 4,
            _ => continue,
        };
        for j in 1..=offset_bytes {
            if i + j < code.len() {
                mask[i + j] = 0;
            }
        }
    }
    mask
}

fn find_loops(binary: &[u8], base_address: u64) -> Vec<BlockSignature> {
    let mut signatures = Vec::new();

    for i in 0..binary.len().saturating_sub(3) {
        // DEC EAX; JNZ rel8 with a backward target.
        if binary[i] != 0xFF || binary[i + 1] != 0xC8 || binary[i + 2] != 0x75 {
            continue;
        }
        let offset = binary[i + 3] as i8;
        if offset >= 0 {
            continue;
        }

        // The loop body spans from the jump target to just past the JNZ.
        let span = (-(offset as i64)) as usize + 4;
        let Some(start) = (i + 4).checked_sub(span) else {
            continue;
        };
        let code = &binary[start..i + 4];

        signatures.push(BlockSignature::from_reference(
            code,
            BlockKind::Loop,
            base_address + start as u64,
            generate_mask(&[code]),
            LOOP_THRESHOLD,
        ));
    }

    signatures
}
