//! Target architectures a check group can be restricted to.

use core::{fmt, str::FromStr};

use serde::Serialize;

/// Architecture tag of a `CHECK-START-<ARCH>` header or a dump's `isa:` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Arm64,
    Mips,
    Mips64,
}

impl Arch {
    /// All architectures, longest directive suffix first so prefix parsers
    /// try `X86_64` before `X86`.
    pub const ALL: [Arch; 6] = [
        Arch::X86_64,
        Arch::X86,
        Arch::Arm64,
        Arch::Arm,
        Arch::Mips64,
        Arch::Mips,
    ];

    /// Suffix used in `CHECK-START-<ARCH>` headers.
    pub fn directive_name(self) -> &'static str {
        match self {
            Arch::X86 => "X86",
            Arch::X86_64 => "X86_64",
            Arch::Arm => "ARM",
            Arch::Arm64 => "ARM64",
            Arch::Mips => "MIPS",
            Arch::Mips64 => "MIPS64",
        }
    }

    /// Name the compiler writes after `isa:` in its dumps.
    pub fn isa_name(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Mips => "mips",
            Arch::Mips64 => "mips64",
        }
    }

    /// Look up an architecture by its dump name.
    pub fn from_isa_name(name: &str) -> Option<Arch> {
        Arch::ALL.into_iter().find(|arch| arch.isa_name() == name)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directive_name())
    }
}

/// Error returned when an architecture name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown architecture '{0}'")]
pub struct UnknownArch(pub String);

impl FromStr for Arch {
    type Err = UnknownArch;

    /// Accepts either spelling, case-insensitively (`ARM64`, `arm64`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Arch::ALL
            .into_iter()
            .find(|arch| arch.directive_name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownArch(s.to_string()))
    }
}
