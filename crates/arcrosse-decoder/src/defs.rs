use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use thiserror::Error;
use tracing::warn;

/// File name the guest definition table is loaded from and seeded to.
pub const GUEST_DEFS_FILE: &str = "x86_defs.txt";

pub type Result<T> = std::result::Result<T, DefsError>;

#[derive(Debug, Error)]
pub enum DefsError {
    #[error("io error on definition file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed definition line {line}: {reason}")]
    Malformed { line: usize, reason: &'static str },
}

/// One guest instruction shape.
///
/// `length` is the nominal encoded length from the definition file; the
/// decoder derives the real consumed length from the flag fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestInstDef {
    pub opcode: u8,
    pub mnemonic: String,
    pub length: u8,
    pub has_modrm: bool,
    pub has_sib: bool,
    pub has_displacement: bool,
    pub has_immediate: bool,
}

/// Opcode-indexed table of guest instruction definitions.
#[derive(Debug, Clone, Default)]
pub struct GuestDefs {
    table: BTreeMap<u8, GuestInstDef>,
}

impl GuestDefs {
    /// Built-in defaults, used when no definition file exists yet.
    pub fn seeded() -> Self {
        let mut defs = Self::default();
        for (opcode, mnemonic, length, modrm, sib, disp, imm) in [
            (0x90u8, "NOP", 1u8, false, false, false, false),
            (0x89, "MOV", 2, true, true, true, false),
            (0x01, "ADD", 2, true, true, true, false),
            (0x29, "SUB", 2, true, true, true, false),
            (0xE8, "CALL", 5, false, false, false, true),
            (0xC3, "RET", 1, false, false, false, false),
            (0x0F, "SIMD_PREFIX", 1, false, false, false, false),
        ] {
            defs.insert(GuestInstDef {
                opcode,
                mnemonic: mnemonic.to_owned(),
                length,
                has_modrm: modrm,
                has_sib: sib,
                has_displacement: disp,
                has_immediate: imm,
            });
        }
        defs
    }

    /// Load `x86_defs.txt` from `dir`, seeding (and writing out) the
    /// defaults when the file is missing or yields an empty table.
    ///
    /// Definition problems are never fatal: unreadable files and malformed
    /// lines degrade to the seeded defaults with a warning.
    pub fn load_or_seed(dir: &Path) -> Self {
        let path = dir.join(GUEST_DEFS_FILE);
        match Self::load(&path) {
            Ok(defs) if !defs.is_empty() => defs,
            Ok(_) => Self::seed_and_write(&path),
            Err(DefsError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::seed_and_write(&path)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable guest defs, using built-in defaults");
                Self::seeded()
            }
        }
    }

    fn seed_and_write(path: &Path) -> Self {
        let defs = Self::seeded();
        if let Err(err) = defs.save(path) {
            warn!(path = %path.display(), error = %err, "could not write seeded guest defs");
        }
        defs
    }

    /// Parse a definition file. Malformed lines are skipped with a warning;
    /// only I/O failure is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut defs = Self::default();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line, idx + 1) {
                Ok(def) => {
                    defs.insert(def);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed guest def line");
                }
            }
        }
        Ok(defs)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        out.push_str("# x86 guest instruction definitions\n");
        out.push_str("# opcode mnemonic length has_modrm has_sib has_displacement has_immediate\n");
        for def in self.table.values() {
            let _ = writeln!(
                out,
                "0x{:02X} {} {} {} {} {} {}",
                def.opcode,
                def.mnemonic,
                def.length,
                def.has_modrm as u8,
                def.has_sib as u8,
                def.has_displacement as u8,
                def.has_immediate as u8,
            );
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Insert a definition, replacing any prior entry for the same opcode.
    pub fn insert(&mut self, def: GuestInstDef) {
        self.table.insert(def.opcode, def);
    }

    pub fn get(&self, opcode: u8) -> Option<&GuestInstDef> {
        self.table.get(&opcode)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GuestInstDef> {
        self.table.values()
    }
}

fn parse_line(line: &str, lineno: usize) -> Result<GuestInstDef> {
    let mut fields = line.split_whitespace();
    let opcode = fields
        .next()
        .and_then(parse_hex_u8)
        .ok_or(DefsError::Malformed {
            line: lineno,
            reason: "bad opcode field",
        })?;
    let mnemonic = fields
        .next()
        .ok_or(DefsError::Malformed {
            line: lineno,
            reason: "missing mnemonic",
        })?
        .to_owned();
    let length: u8 = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or(DefsError::Malformed {
            line: lineno,
            reason: "bad length field",
        })?;
    if length == 0 {
        return Err(DefsError::Malformed {
            line: lineno,
            reason: "length must be at least 1",
        });
    }

    let mut flag = || fields.next().map(|f| f == "1");
    let has_modrm = flag().ok_or(DefsError::Malformed {
        line: lineno,
        reason: "missing has_modrm flag",
    })?;
    let has_sib = flag().ok_or(DefsError::Malformed {
        line: lineno,
        reason: "missing has_sib flag",
    })?;
    let has_displacement = flag().ok_or(DefsError::Malformed {
        line: lineno,
        reason: "missing has_displacement flag",
    })?;
    let has_immediate = flag().ok_or(DefsError::Malformed {
        line: lineno,
        reason: "missing has_immediate flag",
    })?;

    Ok(GuestInstDef {
        opcode,
        mnemonic,
        length,
        has_modrm,
        has_sib,
        has_displacement,
        has_immediate,
    })
}

pub(crate) fn parse_hex_u8(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_table_has_terminators() {
        let defs = GuestDefs::seeded();
        assert!(defs.get(0xC3).is_some());
        assert!(defs.get(0xE8).is_some());
        assert_eq!(defs.get(0x90).unwrap().mnemonic, "NOP");
    }

    #[test]
    fn parse_accepts_bare_and_prefixed_hex() {
        assert_eq!(parse_hex_u8("0x90"), Some(0x90));
        assert_eq!(parse_hex_u8("90"), Some(0x90));
        assert_eq!(parse_hex_u8("zz"), None);
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(parse_line("0x90 NOP", 1).is_err());
        assert!(parse_line("0x90 NOP 0 0 0 0 0", 1).is_err());
        assert!(parse_line("0x90 NOP 1 0 0 0 0", 1).is_ok());
    }
}
