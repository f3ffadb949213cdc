//! Per-group outcomes and the aggregated run report.

use core::fmt;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    arch::Arch,
    directive::CheckKind,
    error::SourceLocation,
    header::{GroupKey, GroupName},
};

/// Why a group failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    /// A `CHECK`, `CHECK-NEXT` or `CHECK-SAME` pattern did not match.
    NotFound,
    /// A `CHECK-NOT` pattern matched inside its window.
    ForbiddenMatchFound,
    /// No assignment of output lines satisfies a `CHECK-DAG` run.
    DagUnsatisfiable,
    /// A pattern or expression used a capture that was never bound.
    UnboundCaptureReference,
    /// A `CHECK-EVAL` expression was false or could not be evaluated.
    EvalFailed,
    /// The group ran out of its time budget.
    MatchTimeout,
    /// The dump has no block for the group.
    MissingOutputBlock,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::NotFound => "NotFound",
            FailureKind::ForbiddenMatchFound => "ForbiddenMatchFound",
            FailureKind::DagUnsatisfiable => "DagUnsatisfiable",
            FailureKind::UnboundCaptureReference => "UnboundCaptureReference",
            FailureKind::EvalFailed => "EvalFailed",
            FailureKind::MatchTimeout => "MatchTimeout",
            FailureKind::MissingOutputBlock => "MissingOutputBlock",
        };
        f.write_str(name)
    }
}

/// The directive line a failure is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDirective {
    pub kind: CheckKind,
    pub text: String,
    pub location: SourceLocation,
}

impl fmt::Display for FailedDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.kind, self.text)
    }
}

/// Half-open range `[start, end)` of block line indices that was searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Output line closest to what the failing directive asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NearestMiss {
    /// Index into the block's lines.
    pub index: usize,
    /// 1-based line number in the dump.
    pub dump_line: usize,
    pub text: String,
    /// Leading pattern segments that matched, out of `total_segments`.
    pub matched_segments: usize,
    pub total_segments: usize,
}

/// Everything known about a failed group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// `None` for [`FailureKind::MissingOutputBlock`].
    pub directive: Option<FailedDirective>,
    /// Block that was searched, or looked for.
    pub block: GroupName,
    pub window: Option<Window>,
    pub nearest_miss: Option<NearestMiss>,
    /// Captures bound when the failure happened.
    pub bindings: BTreeMap<String, String>,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    {}: {}", self.kind, self.message)?;
        if let Some(directive) = &self.directive {
            writeln!(f, "    at {}", directive)?;
        }
        match self.window {
            Some(window) => writeln!(
                f,
                "    searched lines {}..{} of '{}'",
                window.start, window.end, self.block
            )?,
            None => writeln!(f, "    block '{}'", self.block)?,
        }
        if let Some(miss) = &self.nearest_miss {
            writeln!(
                f,
                "    nearest line {} ({}/{} segments): {}",
                miss.dump_line,
                miss.matched_segments,
                miss.total_segments,
                miss.text.trim()
            )?;
        }
        if !self.bindings.is_empty() {
            let bound: Vec<String> = self
                .bindings
                .iter()
                .map(|(name, value)| format!("{} = {}", name, value))
                .collect();
            writeln!(f, "    bindings: {}", bound.join(", "))?;
        }
        Ok(())
    }
}

/// Why a group was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The group is tagged for an architecture other than the selected one.
    ArchMismatch {
        group: Arch,
        selected: Option<Arch>,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ArchMismatch {
                group,
                selected: Some(selected),
            } => write!(f, "{} group, {} selected", group, selected),
            SkipReason::ArchMismatch {
                group,
                selected: None,
            } => write!(f, "{} group, no architecture selected", group),
        }
    }
}

/// Result of evaluating one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    Passed {
        bindings: BTreeMap<String, String>,
        /// Block line matched by each directive line, `None` for
        /// `CHECK-NOT` and `CHECK-EVAL`.
        trace: Vec<Option<usize>>,
    },
    Failed {
        failure: Failure,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl GroupOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, GroupOutcome::Passed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, GroupOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, GroupOutcome::Skipped { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            GroupOutcome::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

/// Outcome of one group, labelled with the group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub key: GroupKey,
    pub location: SourceLocation,
    pub outcome: GroupOutcome,
}

impl fmt::Display for GroupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            GroupOutcome::Passed { .. } => writeln!(f, "PASS {} ({})", self.key, self.location),
            GroupOutcome::Failed { failure } => {
                writeln!(f, "FAIL {} ({})", self.key, self.location)?;
                write!(f, "{}", failure)
            }
            GroupOutcome::Skipped { reason } => {
                writeln!(f, "SKIP {} ({}): {}", self.key, self.location, reason)
            }
        }
    }
}

/// All group outcomes of one run, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub source: String,
    /// Architecture the run selected, if any.
    pub arch: Option<Arch>,
    pub groups: Vec<GroupReport>,
}

impl Report {
    pub fn passed(&self) -> usize {
        self.groups.iter().filter(|g| g.outcome.is_passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.groups.iter().filter(|g| g.outcome.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.groups.iter().filter(|g| g.outcome.is_skipped()).count()
    }

    /// True iff no evaluated group failed. Skipped groups never fail a run.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit status for this report: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&GroupReport, &Failure)> {
        self.groups
            .iter()
            .filter_map(|g| g.outcome.failure().map(|f| (g, f)))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            write!(f, "{}", group)?;
        }
        write!(
            f,
            "{}: {} passed, {} failed, {} skipped",
            self.source,
            self.passed(),
            self.failed(),
            self.skipped()
        )
    }
}
