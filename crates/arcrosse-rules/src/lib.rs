//! AArch64 host instruction definitions and the translation rule table.
//!
//! Translation here is deliberately table-driven and total: a decoded guest
//! instruction either matches a rule (whose host words are appended
//! verbatim) or falls back to a single host NOP. Semantic fidelity of the
//! mappings is the concern of whoever authors `translation_rules.txt`, not
//! of this crate.

mod host_defs;
mod rules;

pub use crate::host_defs::{HostDefs, HostInstDef, HOST_DEFS_FILE};
pub use crate::rules::{RuleSet, TranslationRule, TRANSLATION_RULES_FILE};

use thiserror::Error;

/// AArch64 `NOP`, the fallback emitted for guest opcodes with no rule.
pub const HOST_NOP: u32 = 0xD503_201F;

pub type Result<T> = std::result::Result<T, RulesError>;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("io error on rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed line {line}: {reason}")]
    Malformed { line: usize, reason: &'static str },
}

pub(crate) fn parse_hex_u32(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u32::from_str_radix(digits, 16).ok()
}

pub(crate) fn parse_hex_u8(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16).ok()
}
