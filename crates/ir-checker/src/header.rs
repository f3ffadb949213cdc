//! Group name grammar shared by `CHECK-START` headers and dump banners.
//!
//! Both spell a group as `<signature> <pass-name> (<phase>)`, e.g.
//! `boolean Main.stringEqualsSame() instruction_simplifier (before)`.

use core::fmt;

use serde::Serialize;

use crate::arch::Arch;

/// Whether a dump was taken before or after its pass ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<signature> <pass-name> (<phase>)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupName {
    /// Method signature, e.g. `boolean Main.stringEqualsSame()`.
    pub method: String,
    pub pass: String,
    pub phase: Phase,
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.method, self.pass, self.phase)
    }
}

/// Full key of a check group: the name plus an optional architecture tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub name: GroupName,
    pub arch: Option<Arch>,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arch {
            Some(arch) => write!(f, "[{}] {}", arch, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Why a group name failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("expected '(before)' or '(after)' at the end of '{0}'")]
    MissingPhase(String),
    #[error("unknown phase '{0}', expected 'before' or 'after'")]
    UnknownPhase(String),
    #[error("missing pass name in '{0}'")]
    MissingPass(String),
    #[error("missing method signature in '{0}'")]
    MissingMethod(String),
}

/// Parse `<signature> <pass-name> (<phase>)`, splitting from the right since
/// signatures contain spaces and parentheses of their own.
pub fn parse_group_name(text: &str) -> Result<GroupName, HeaderError> {
    let trimmed = text.trim();
    let missing_phase = || HeaderError::MissingPhase(trimmed.to_string());

    let without_close = trimmed.strip_suffix(')').ok_or_else(missing_phase)?;
    let open = without_close.rfind('(').ok_or_else(missing_phase)?;
    let phase = match without_close[open + 1..].trim() {
        "before" => Phase::Before,
        "after" => Phase::After,
        other => return Err(HeaderError::UnknownPhase(other.to_string())),
    };

    let head = without_close[..open].trim_end();
    if head.is_empty() {
        return Err(HeaderError::MissingPass(trimmed.to_string()));
    }
    let (method, pass) = match head.rsplit_once(char::is_whitespace) {
        Some((method, pass)) => (method.trim(), pass),
        None => return Err(HeaderError::MissingMethod(trimmed.to_string())),
    };
    if method.is_empty() {
        return Err(HeaderError::MissingMethod(trimmed.to_string()));
    }

    Ok(GroupName {
        method: method.to_string(),
        pass: pass.to_string(),
        phase,
    })
}
