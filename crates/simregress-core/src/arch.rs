//! Architecture detection from a simulator path and ISA test-family selection.
//!
//! Simulator builds are conventionally placed in directories named after the
//! architecture they implement, e.g. `builds/RV32IMU_verilator/exe_HW_sim`.
//! The architecture string decides which RISC-V ISA test families apply.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Base integer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Xlen {
    Rv32,
    Rv64,
}

impl Xlen {
    fn prefix(&self) -> &'static str {
        match self {
            Xlen::Rv32 => "rv32",
            Xlen::Rv64 => "rv64",
        }
    }
}

/// Architecture string such as `RV64AIMSU`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchSpec {
    pub xlen: Xlen,

    /// Upper-case extension letters following the `RV32`/`RV64` prefix.
    pub extensions: String,
}

impl ArchSpec {
    /// Extract the architecture from anywhere in `path`.
    ///
    /// `RV32` takes precedence over `RV64` when both occur. Returns `None`
    /// when neither is present.
    pub fn from_simulator_path(path: &Path) -> Option<Self> {
        let upper = path.to_string_lossy().to_uppercase();
        let (start, xlen) = match (upper.find("RV32"), upper.find("RV64")) {
            (Some(j), _) => (j, Xlen::Rv32),
            (None, Some(j)) => (j, Xlen::Rv64),
            (None, None) => return None,
        };

        let extensions: String = upper[start + 4..]
            .chars()
            .take_while(|c| c.is_ascii_uppercase())
            .collect();

        Some(Self { xlen, extensions })
    }

    fn has(&self, ext: char) -> bool {
        self.extensions.contains(ext.to_ascii_uppercase())
    }

    /// ISA test families relevant to this architecture.
    ///
    /// Integer user and machine tests always apply. Supervisor support adds
    /// the virtual-memory (`-v`) variants and supervisor tests. Each of the
    /// M, A, F, D and C extensions adds its own family.
    pub fn test_families(&self) -> Vec<String> {
        let rv = self.xlen.prefix();
        let supervisor = self.has('S');

        let mut families = vec![format!("{rv}ui-p"), format!("{rv}mi-p")];
        if supervisor {
            families.push(format!("{rv}ui-v"));
            families.push(format!("{rv}si-p"));
        }

        for ext in ['m', 'a', 'f', 'd', 'c'] {
            if self.has(ext) {
                families.push(format!("{rv}u{ext}-p"));
                if supervisor {
                    families.push(format!("{rv}u{ext}-v"));
                }
            }
        }

        families
    }
}

impl fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.xlen {
            Xlen::Rv32 => "RV32",
            Xlen::Rv64 => "RV64",
        };
        write!(f, "{base}{}", self.extensions)
    }
}
