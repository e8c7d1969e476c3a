use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::warn;

use crate::{parse_hex_u32, Result, RulesError};

/// File name the host definition table is loaded from and seeded to.
pub const HOST_DEFS_FILE: &str = "arm_defs.txt";

/// One host (AArch64) instruction definition.
///
/// Invariant: `encoding & mask == value`. Definitions violating it are
/// rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInstDef {
    pub encoding: u32,
    pub mnemonic: String,
    pub mask: u32,
    pub value: u32,
}

impl HostInstDef {
    pub fn is_well_formed(&self) -> bool {
        self.encoding & self.mask == self.value
    }
}

/// Encoding-indexed table of host instruction definitions.
#[derive(Debug, Clone, Default)]
pub struct HostDefs {
    table: BTreeMap<u32, HostInstDef>,
}

impl HostDefs {
    pub fn seeded() -> Self {
        let mut defs = Self::default();
        for (encoding, mnemonic, mask, value) in [
            (0xD503_201Fu32, "NOP", 0xFFFF_FFFFu32, 0xD503_201Fu32),
            (0xAA00_03E0, "MOV", 0xFFE0_FFFF, 0xAA00_03E0),
            (0x8B01_0000, "ADD", 0xFFE0_FC00, 0x8B01_0000),
            (0xCB01_0000, "SUB", 0xFFE0_FC00, 0xCB01_0000),
        ] {
            defs.insert(HostInstDef {
                encoding,
                mnemonic: mnemonic.to_owned(),
                mask,
                value,
            });
        }
        defs
    }

    pub fn load_or_seed(dir: &Path) -> Self {
        let path = dir.join(HOST_DEFS_FILE);
        match Self::load(&path) {
            Ok(defs) if !defs.is_empty() => defs,
            Ok(_) => Self::seed_and_write(&path),
            Err(RulesError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::seed_and_write(&path)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable host defs, using built-in defaults");
                Self::seeded()
            }
        }
    }

    fn seed_and_write(path: &Path) -> Self {
        let defs = Self::seeded();
        if let Err(err) = defs.save(path) {
            warn!(path = %path.display(), error = %err, "could not write seeded host defs");
        }
        defs
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut defs = Self::default();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line, idx + 1) {
                Ok(def) if def.is_well_formed() => {
                    defs.insert(def);
                }
                Ok(def) => {
                    warn!(
                        encoding = format_args!("{:#010X}", def.encoding),
                        "host def violates encoding & mask == value, skipping"
                    );
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed host def line");
                }
            }
        }
        Ok(defs)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        out.push_str("# AArch64 host instruction definitions\n");
        out.push_str("# encoding mnemonic mask value\n");
        for def in self.table.values() {
            let _ = writeln!(
                out,
                "0x{:08X} {} 0x{:08X} 0x{:08X}",
                def.encoding, def.mnemonic, def.mask, def.value
            );
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    pub fn insert(&mut self, def: HostInstDef) {
        self.table.insert(def.encoding, def);
    }

    pub fn get(&self, encoding: u32) -> Option<&HostInstDef> {
        self.table.get(&encoding)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn parse_line(line: &str, lineno: usize) -> Result<HostInstDef> {
    let mut fields = line.split_whitespace();
    let encoding = fields
        .next()
        .and_then(parse_hex_u32)
        .ok_or(RulesError::Malformed {
            line: lineno,
            reason: "bad encoding field",
        })?;
    let mnemonic = fields
        .next()
        .ok_or(RulesError::Malformed {
            line: lineno,
            reason: "missing mnemonic",
        })?
        .to_owned();
    let mask = fields
        .next()
        .and_then(parse_hex_u32)
        .ok_or(RulesError::Malformed {
            line: lineno,
            reason: "bad mask field",
        })?;
    let value = fields
        .next()
        .and_then(parse_hex_u32)
        .ok_or(RulesError::Malformed {
            line: lineno,
            reason: "bad value field",
        })?;

    Ok(HostInstDef {
        encoding,
        mnemonic,
        mask,
        value,
    })
}
