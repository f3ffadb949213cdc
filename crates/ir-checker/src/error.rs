//! Fatal errors: broken test definitions or unreadable dumps.
//!
//! Failures of a single group (a pattern not found, a forbidden line present)
//! are not errors; they are collected in the [`Report`](crate::Report).

use core::fmt;

use serde::Serialize;

use crate::{
    arch::UnknownArch,
    directive::CheckKind,
    expr::ExprError,
    header::HeaderError,
    output::OutputError,
    pattern::PatternError,
};

/// Result type for checker runs.
pub type CheckerResult<T> = Result<T, CheckerError>;

/// Position of a directive in the test source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceLocation {
    pub file: String,
    /// 1-based.
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// What is wrong with a directive line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    #[error("directive appears before any CHECK-START header")]
    OutsideGroup,
    #[error("{0} must directly follow CHECK, CHECK-NEXT or CHECK-SAME")]
    MissingAnchor(CheckKind),
    #[error("unknown directive 'CHECK{0}'")]
    UnknownKeyword(String),
    #[error("expected ':' after the directive keyword")]
    MissingColon,
    #[error(transparent)]
    Arch(#[from] UnknownArch),
    #[error("invalid group name: {0}")]
    Header(#[from] HeaderError),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("CHECK-NOT cannot define capture '{0}'")]
    CaptureInNot(String),
    #[error("invalid expression: {0}")]
    Expr(#[from] ExprError),
}

/// A directive that violates the directive grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{location}: malformed directive '{text}': {reason}")]
pub struct MalformedDirective {
    pub location: SourceLocation,
    /// The comment text after the comment prefix.
    pub text: String,
    pub reason: DirectiveError,
}

/// Errors that abort a whole checker run.
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error(transparent)]
    MalformedDirective(#[from] MalformedDirective),
    #[error("malformed compiler output at {0}")]
    MalformedOutput(#[from] OutputError),
    #[error("failed to start checker workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CheckerError {
    /// The malformed directive, if that is what stopped the run.
    pub fn as_malformed_directive(&self) -> Option<&MalformedDirective> {
        match self {
            CheckerError::MalformedDirective(e) => Some(e),
            _ => None,
        }
    }
}
