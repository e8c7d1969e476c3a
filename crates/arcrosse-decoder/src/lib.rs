//! Table-driven x86-64 instruction decoder and basic-block scanner.
//!
//! The decoder does not aim for architectural completeness: it decodes
//! exactly the instruction shapes described by a [`GuestDefs`] table loaded
//! from `x86_defs.txt`, enough to find block boundaries and to key the
//! translation rule table. Opcodes absent from the table decode as bare
//! one-byte instructions; the rule applicator turns those into host NOPs.

mod decode;
mod defs;

pub use crate::decode::{decode_at, scan_block, DecodedInst};
pub use crate::defs::{DefsError, GuestDefs, GuestInstDef, GUEST_DEFS_FILE};

/// Hard cap on the byte length of a scanned basic block.
pub const MAX_BLOCK_BYTES: usize = 1024;

/// Opcodes that terminate a basic block: `RET`, `CALL`, `JMP rel32`.
pub const BLOCK_TERMINATORS: [u8; 3] = [0xC3, 0xE8, 0xE9];
