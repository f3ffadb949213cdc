//! Assignment search for runs of `CHECK-DAG` lines.
//!
//! Each line in the run needs its own output line inside the window, and the
//! captures of all lines must agree. Lines are assigned in source order and
//! candidates tried in ascending order, so the first complete assignment found
//! is the lexicographically smallest one.

use std::time::Instant;

use crate::{
    bindings::Bindings,
    pattern::{Pattern, UnboundCapture},
};

/// A successful assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DagAssignment {
    /// Block line assigned to each pattern, in pattern order.
    pub lines: Vec<usize>,
    pub bindings: Bindings,
}

/// Why the search gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DagError {
    /// No assignment exists. `deepest` is the pattern the search could not
    /// get past in its most complete attempt.
    Unsatisfiable { deepest: usize },
    Unbound { pattern: usize, name: String },
    Timeout { pattern: usize },
}

pub(crate) struct DagSearch<'a> {
    patterns: &'a [&'a Pattern],
    lines: &'a [String],
    window: (usize, usize),
    deadline: Option<Instant>,
    used: Vec<usize>,
    deepest: usize,
    nodes: u64,
}

impl<'a> DagSearch<'a> {
    pub fn new(
        patterns: &'a [&'a Pattern],
        lines: &'a [String],
        window: (usize, usize),
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            patterns,
            lines,
            window: (window.0, window.1.min(lines.len())),
            deadline,
            used: Vec::with_capacity(patterns.len()),
            deepest: 0,
            nodes: 0,
        }
    }

    pub fn run(mut self, bindings: &Bindings) -> Result<DagAssignment, DagError> {
        let found = self.search(0, bindings)?;
        log::trace!(
            "dag search over {} lines: {} nodes",
            self.patterns.len(),
            self.nodes
        );
        found.ok_or(DagError::Unsatisfiable {
            deepest: self.deepest,
        })
    }

    fn search(
        &mut self,
        depth: usize,
        bindings: &Bindings,
    ) -> Result<Option<DagAssignment>, DagError> {
        if depth == self.patterns.len() {
            return Ok(Some(DagAssignment {
                lines: self.used.clone(),
                bindings: bindings.clone(),
            }));
        }
        self.nodes += 1;
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DagError::Timeout { pattern: depth });
        }
        self.deepest = self.deepest.max(depth);

        let matcher = self.patterns[depth]
            .instantiate(bindings)
            .map_err(|UnboundCapture(name)| DagError::Unbound {
                pattern: depth,
                name,
            })?;

        let (start, end) = self.window;
        for candidate in start..end {
            if self.used.contains(&candidate) {
                continue;
            }
            let Some(found) = matcher.find(&self.lines[candidate], 0) else {
                continue;
            };
            let mut next = bindings.clone();
            let consistent = found
                .captures
                .iter()
                .all(|(name, value)| next.bind(name, value).is_ok());
            if !consistent {
                continue;
            }
            self.used.push(candidate);
            if let Some(assignment) = self.search(depth + 1, &next)? {
                return Ok(Some(assignment));
            }
            self.used.pop();
        }
        Ok(None)
    }
}
