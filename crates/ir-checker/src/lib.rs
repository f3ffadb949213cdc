//! Checker for compiler IR dumps and disassembly.
//!
//! Test sources carry expectations in comments:
//! - `CHECK-START[-<ARCH>]: <signature> <pass> (<phase>)` opens a group
//! - `CHECK`, `CHECK-NEXT`, `CHECK-SAME` match in order
//! - `CHECK-NOT` forbids a pattern between its neighbours
//! - `CHECK-DAG` matches a run of lines in any order
//! - `CHECK-EVAL` tests an expression over captured values
//!
//! Each group is matched against the dump block of the same method, pass and
//! phase. See [`check`] for the one-call entry point.

pub mod arch;
pub mod bindings;
pub mod config;
pub mod directive;
pub mod error;
pub mod expr;
pub mod header;
pub mod matcher;
pub mod output;
pub mod pattern;
pub mod report;
mod runner;

pub use arch::Arch;
pub use bindings::Bindings;
pub use config::CheckerConfig;
pub use directive::{extract_groups, CheckBody, CheckGroup, CheckKind, CheckLine};
pub use error::{CheckerError, CheckerResult, DirectiveError, MalformedDirective, SourceLocation};
pub use header::{parse_group_name, GroupKey, GroupName, Phase};
pub use matcher::evaluate_group;
pub use output::{parse_dump, Dump, IsaFeatures, OutputBlock, OutputError};
pub use pattern::{Pattern, PatternError, Segment};
pub use report::{
    FailedDirective, Failure, FailureKind, GroupOutcome, GroupReport, NearestMiss, Report,
    SkipReason, Window,
};
pub use runner::{check, check_groups};
