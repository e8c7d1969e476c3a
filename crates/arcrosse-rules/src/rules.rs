use std::fmt::Write as _;
use std::path::Path;

use arcrosse_decoder::DecodedInst;
use tracing::{debug, warn};

use crate::{parse_hex_u32, parse_hex_u8, Result, RulesError, HOST_NOP};

/// File name the translation rule table is loaded from and seeded to.
pub const TRANSLATION_RULES_FILE: &str = "translation_rules.txt";

/// One guest-opcode → host-words mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRule {
    pub guest_opcode: u8,
    pub host_words: Vec<u32>,
    pub description: String,
}

/// Ordered rule table. Application picks the first rule whose guest opcode
/// matches, so file order is meaningful.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<TranslationRule>,
}

impl RuleSet {
    pub fn seeded() -> Self {
        let rule = |guest_opcode, host_words: &[u32], description: &str| TranslationRule {
            guest_opcode,
            host_words: host_words.to_vec(),
            description: description.to_owned(),
        };
        Self {
            rules: vec![
                rule(0x90, &[0xD503_201F], "NOP -> NOP"),
                rule(0x89, &[0xAA00_03E0], "MOV reg, reg -> MOV X0, X0"),
                rule(0x01, &[0x8B01_0000], "ADD reg, reg -> ADD X0, X0, X1"),
                rule(0x29, &[0xCB01_0000], "SUB reg, reg -> SUB X0, X0, X1"),
                rule(0xE8, &[0xF81F_0FE0, 0x9400_0000], "CALL -> STR X0, [SP, -16]! + BL"),
                rule(0xC3, &[0xF841_07E0, 0xD65F_03C0], "RET -> LDR X0, [SP], 16 + RET"),
                rule(0x0F, &[0x4EA0_1C00], "SIMD -> MOV NEON"),
            ],
        }
    }

    pub fn load_or_seed(dir: &Path) -> Self {
        let path = dir.join(TRANSLATION_RULES_FILE);
        match Self::load(&path) {
            Ok(rules) if !rules.is_empty() => rules,
            Ok(_) => Self::seed_and_write(&path),
            Err(RulesError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::seed_and_write(&path)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable translation rules, using built-in defaults");
                Self::seeded()
            }
        }
    }

    fn seed_and_write(path: &Path) -> Self {
        let rules = Self::seeded();
        if let Err(err) = rules.save(path) {
            warn!(path = %path.display(), error = %err, "could not write seeded translation rules");
        }
        rules
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut rules = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line, idx + 1) {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed translation rule");
                }
            }
        }
        Ok(Self { rules })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        out.push_str("# Guest-to-host translation rules\n");
        out.push_str("# x86_opcode arm_opcode1 [arm_opcode2 ...] # description\n");
        for rule in &self.rules {
            let _ = write!(out, "0x{:02X}", rule.guest_opcode);
            for word in &rule.host_words {
                let _ = write!(out, " 0x{word:08X}");
            }
            let _ = writeln!(out, " # {}", rule.description);
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    pub fn push(&mut self, rule: TranslationRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Append the host words for `inst` to `out`.
    ///
    /// The first rule matching the guest opcode wins. Opcodes with no rule
    /// emit a single host NOP; translation never fails.
    pub fn apply(&self, inst: &DecodedInst, out: &mut Vec<u32>) {
        match self.rules.iter().find(|r| r.guest_opcode == inst.opcode) {
            Some(rule) => out.extend_from_slice(&rule.host_words),
            None => {
                debug!(
                    opcode = format_args!("{:#04X}", inst.opcode),
                    "no translation rule, emitting host NOP"
                );
                out.push(HOST_NOP);
            }
        }
    }
}

fn parse_line(line: &str, lineno: usize) -> Result<TranslationRule> {
    let mut fields = line.split_whitespace();
    let guest_opcode = fields
        .next()
        .and_then(parse_hex_u8)
        .ok_or(RulesError::Malformed {
            line: lineno,
            reason: "bad guest opcode field",
        })?;

    let mut host_words = Vec::new();
    let mut description = String::new();
    while let Some(token) = fields.next() {
        if token == "#" {
            description = fields.collect::<Vec<_>>().join(" ");
            break;
        }
        let word = parse_hex_u32(token).ok_or(RulesError::Malformed {
            line: lineno,
            reason: "bad host word field",
        })?;
        host_words.push(word);
    }

    if host_words.is_empty() {
        return Err(RulesError::Malformed {
            line: lineno,
            reason: "rule has no host words",
        });
    }

    Ok(TranslationRule {
        guest_opcode,
        host_words,
        description,
    })
}
