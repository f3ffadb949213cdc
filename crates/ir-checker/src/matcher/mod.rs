//! Matching one check group against one output block.
//!
//! Directive lines run in source order against a cursor into the block:
//!
//! - `CHECK` scans forward from the cursor and moves it past the match.
//! - `CHECK-NEXT` must match the line at the cursor.
//! - `CHECK-SAME` continues on the line of the previous match.
//! - `CHECK-NOT` forbids its pattern between the cursor and whatever the next
//!   positional directive resolves to (the end of the block if nothing does).
//! - A run of `CHECK-DAG` lines matches in any order, preferably before the
//!   next `CHECK`; the next `CHECK` must then match after the whole run.
//! - `CHECK-EVAL` tests an expression over the captures bound so far.

mod dag;

use std::time::Instant;

use crate::{
    bindings::Bindings,
    directive::{CheckBody, CheckGroup, CheckKind, CheckLine},
    expr::{EvalEnv, EvalError, Expr},
    output::{IsaFeatures, OutputBlock},
    pattern::{LineMatch, Pattern, UnboundCapture},
    report::{FailedDirective, Failure, FailureKind, GroupOutcome, NearestMiss, Window},
};

use self::dag::{DagError, DagSearch};

/// Evaluate `group` against `block`.
///
/// `deadline` bounds the evaluation; it is checked before every directive
/// line and at every step of a `CHECK-DAG` search.
pub fn evaluate_group(
    group: &CheckGroup,
    block: &OutputBlock,
    isa_features: &IsaFeatures,
    deadline: Option<Instant>,
) -> GroupOutcome {
    let mut matcher = GroupMatcher::new(group, block, isa_features, deadline);
    match matcher.run() {
        Ok(()) => GroupOutcome::Passed {
            bindings: matcher.bindings.snapshot(),
            trace: matcher.trace,
        },
        Err(failure) => GroupOutcome::Failed { failure },
    }
}

/// A `CHECK-NOT` waiting for the next positional directive to close its window.
#[derive(Debug, Clone, Copy)]
struct PendingNot {
    line: usize,
    start: usize,
}

struct GroupMatcher<'a> {
    group: &'a CheckGroup,
    block: &'a OutputBlock,
    isa_features: &'a IsaFeatures,
    deadline: Option<Instant>,
    bindings: Bindings,
    cursor: usize,
    /// Line and byte offset right after the most recent positional match.
    last_match: Option<(usize, usize)>,
    pending_nots: Vec<PendingNot>,
    trace: Vec<Option<usize>>,
}

impl<'a> GroupMatcher<'a> {
    fn new(
        group: &'a CheckGroup,
        block: &'a OutputBlock,
        isa_features: &'a IsaFeatures,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            group,
            block,
            isa_features,
            deadline,
            bindings: Bindings::new(),
            cursor: 0,
            last_match: None,
            pending_nots: Vec::new(),
            trace: vec![None; group.lines.len()],
        }
    }

    fn run(&mut self) -> Result<(), Failure> {
        let group = self.group;
        let lines = &group.lines;
        let mut index = 0;
        while index < lines.len() {
            if self.expired() {
                return Err(self.fail(
                    index,
                    FailureKind::MatchTimeout,
                    None,
                    None,
                    "time budget exhausted".to_string(),
                ));
            }
            let line = &lines[index];
            match line.kind {
                CheckKind::Match => self.match_forward(index)?,
                CheckKind::Next => self.match_next(index)?,
                CheckKind::Same => self.match_same(index)?,
                CheckKind::Not => self.pending_nots.push(PendingNot {
                    line: index,
                    start: self.cursor,
                }),
                CheckKind::Dag => {
                    let end = lines[index..]
                        .iter()
                        .position(|l| l.kind != CheckKind::Dag)
                        .map_or(lines.len(), |n| index + n);
                    self.match_dag(index, end)?;
                    index = end;
                    continue;
                }
                CheckKind::Eval => self.evaluate(index)?,
            }
            index += 1;
        }
        self.close_nots(self.block.lines.len())
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn line(&self, index: usize) -> &'a CheckLine {
        &self.group.lines[index]
    }

    fn pattern(&self, index: usize) -> &'a Pattern {
        match self.line(index).pattern() {
            Some(pattern) => pattern,
            None => unreachable!("CHECK-EVAL has no pattern"),
        }
    }

    fn fail(
        &self,
        index: usize,
        kind: FailureKind,
        window: Option<Window>,
        nearest_miss: Option<NearestMiss>,
        message: String,
    ) -> Failure {
        let line = self.line(index);
        Failure {
            kind,
            directive: Some(FailedDirective {
                kind: line.kind,
                text: line.text.clone(),
                location: line.location.clone(),
            }),
            block: self.block.name.clone(),
            window,
            nearest_miss,
            bindings: self.bindings.snapshot(),
            message,
        }
    }

    fn unbound(&self, index: usize, UnboundCapture(name): UnboundCapture) -> Failure {
        self.fail(
            index,
            FailureKind::UnboundCaptureReference,
            None,
            None,
            format!("capture '{}' is referenced before it is bound", name),
        )
    }

    fn not_found(&self, index: usize, window: Window) -> Failure {
        let nearest = self.nearest_miss(self.pattern(index), window);
        self.fail(
            index,
            FailureKind::NotFound,
            Some(window),
            nearest,
            "no matching line".to_string(),
        )
    }

    /// Line in `window` whose text matches the longest prefix of `pattern`.
    fn nearest_miss(&self, pattern: &Pattern, window: Window) -> Option<NearestMiss> {
        if window.is_empty() {
            return None;
        }
        let end = window.end.min(self.block.lines.len());
        let mut best: Option<(usize, usize)> = None;
        for index in window.start..end {
            let score = pattern.prefix_score(&self.block.lines[index], &self.bindings);
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((index, score));
            }
        }
        best.map(|(index, score)| self.miss_at(index, score, pattern))
    }

    fn miss_at(&self, index: usize, matched_segments: usize, pattern: &Pattern) -> NearestMiss {
        NearestMiss {
            index,
            dump_line: self.block.dump_line(index),
            text: self.block.lines[index].clone(),
            matched_segments,
            total_segments: pattern.segments().len(),
        }
    }

    fn bind_all(&mut self, index: usize, found: &LineMatch) -> Result<(), Failure> {
        for (name, value) in &found.captures {
            if let Err(conflict) = self.bindings.bind(name, value) {
                return Err(self.fail(
                    index,
                    FailureKind::NotFound,
                    None,
                    None,
                    conflict.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Record a positional match at block line `at`.
    fn accept(&mut self, index: usize, at: usize, found: &LineMatch) -> Result<(), Failure> {
        self.bind_all(index, found)?;
        self.close_nots(at)?;
        self.trace[index] = Some(at);
        self.last_match = Some((at, found.end));
        Ok(())
    }

    fn match_forward(&mut self, index: usize) -> Result<(), Failure> {
        let matcher = self
            .pattern(index)
            .instantiate(&self.bindings)
            .map_err(|e| self.unbound(index, e))?;
        let block = self.block;
        let lines = &block.lines;
        let found = (self.cursor..lines.len())
            .find_map(|at| matcher.find(&lines[at], 0).map(|m| (at, m)));
        let Some((at, found)) = found else {
            return Err(self.not_found(index, Window::new(self.cursor, lines.len())));
        };
        self.accept(index, at, &found)?;
        self.cursor = at + 1;
        Ok(())
    }

    fn match_next(&mut self, index: usize) -> Result<(), Failure> {
        let matcher = self
            .pattern(index)
            .instantiate(&self.bindings)
            .map_err(|e| self.unbound(index, e))?;
        let at = self.cursor;
        let found = self
            .block
            .lines
            .get(at)
            .and_then(|text| matcher.find(text, 0));
        let Some(found) = found else {
            let end = (at + 1).min(self.block.lines.len());
            return Err(self.not_found(index, Window::new(at, end)));
        };
        self.accept(index, at, &found)?;
        self.cursor = at + 1;
        Ok(())
    }

    fn match_same(&mut self, index: usize) -> Result<(), Failure> {
        let matcher = self
            .pattern(index)
            .instantiate(&self.bindings)
            .map_err(|e| self.unbound(index, e))?;
        let found = self.last_match.and_then(|(at, from)| {
            matcher
                .find(&self.block.lines[at], from)
                .map(|m| (at, m))
        });
        let Some((at, found)) = found else {
            let window = self
                .last_match
                .map_or(Window::new(self.cursor, self.cursor), |(at, _)| {
                    Window::new(at, at + 1)
                });
            return Err(self.not_found(index, window));
        };
        self.bind_all(index, &found)?;
        self.trace[index] = Some(at);
        self.last_match = Some((at, found.end));
        Ok(())
    }

    /// Check every pending `CHECK-NOT` against `[start, end)`.
    fn close_nots(&mut self, end: usize) -> Result<(), Failure> {
        let pending = std::mem::take(&mut self.pending_nots);
        for not in pending {
            let matcher = self
                .pattern(not.line)
                .instantiate(&self.bindings)
                .map_err(|e| self.unbound(not.line, e))?;
            let window = Window::new(not.start, end);
            let hit = (not.start..end.min(self.block.lines.len()))
                .find(|&at| matcher.is_match(&self.block.lines[at]));
            if let Some(at) = hit {
                let pattern = self.pattern(not.line);
                let miss = self.miss_at(at, pattern.segments().len(), pattern);
                return Err(self.fail(
                    not.line,
                    FailureKind::ForbiddenMatchFound,
                    Some(window),
                    Some(miss),
                    format!("forbidden line found at dump line {}", self.block.dump_line(at)),
                ));
            }
        }
        Ok(())
    }

    /// Line the first `CHECK` after a DAG run would match, tried first as the
    /// run's upper bound. Block end when there is none or it cannot be
    /// resolved yet.
    fn dag_bound(&self, after: usize) -> usize {
        let len = self.block.lines.len();
        let next = self.group.lines[after..]
            .iter()
            .position(|l| l.kind != CheckKind::Not)
            .map(|n| after + n)
            .filter(|&n| self.line(n).kind == CheckKind::Match);
        let Some(next) = next else {
            return len;
        };
        let Ok(matcher) = self.pattern(next).instantiate(&self.bindings) else {
            return len;
        };
        (self.cursor..len)
            .find(|&at| matcher.is_match(&self.block.lines[at]))
            .unwrap_or(len)
    }

    fn match_dag(&mut self, start: usize, end: usize) -> Result<(), Failure> {
        let len = self.block.lines.len();
        let bound = self.dag_bound(end);
        let patterns: Vec<&Pattern> = (start..end).map(|i| self.pattern(i)).collect();
        let search = |window: Window| {
            DagSearch::new(
                &patterns,
                &self.block.lines,
                (window.start, window.end),
                self.deadline,
            )
            .run(&self.bindings)
        };

        let mut window = Window::new(self.cursor, bound);
        let mut result = search(window);
        if bound < len && matches!(result, Err(DagError::Unsatisfiable { .. })) {
            log::debug!(
                "dag run at {} unsatisfiable before line {}, widening to block end",
                self.line(start).location,
                bound
            );
            window = Window::new(self.cursor, len);
            result = search(window);
        }

        match result {
            Ok(assignment) => {
                let first = assignment.lines.iter().copied().min().unwrap_or(self.cursor);
                let last = assignment.lines.iter().copied().max().unwrap_or(self.cursor);
                self.bindings = assignment.bindings;
                self.close_nots(first)?;
                for (offset, at) in assignment.lines.into_iter().enumerate() {
                    self.trace[start + offset] = Some(at);
                }
                self.cursor = self.cursor.max(last + 1);
                self.last_match = None;
                Ok(())
            }
            Err(DagError::Unsatisfiable { deepest }) => {
                let index = start + deepest;
                let nearest = self.nearest_miss(self.pattern(index), window);
                Err(self.fail(
                    index,
                    FailureKind::DagUnsatisfiable,
                    Some(window),
                    nearest,
                    format!("no assignment of distinct lines satisfies {} CHECK-DAG lines", end - start),
                ))
            }
            Err(DagError::Unbound { pattern, name }) => {
                Err(self.unbound(start + pattern, UnboundCapture(name)))
            }
            Err(DagError::Timeout { pattern }) => Err(self.fail(
                start + pattern,
                FailureKind::MatchTimeout,
                Some(window),
                None,
                "time budget exhausted during CHECK-DAG search".to_string(),
            )),
        }
    }

    fn evaluate(&mut self, index: usize) -> Result<(), Failure> {
        let CheckBody::Expr(expr) = &self.line(index).body else {
            return Ok(());
        };
        let env = EvalEnv {
            bindings: &self.bindings,
            isa_features: self.isa_features,
        };
        match Expr::evaluate_bool(expr, env) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.fail(
                index,
                FailureKind::EvalFailed,
                None,
                None,
                "expression is false".to_string(),
            )),
            Err(EvalError::Unbound(name)) => Err(self.unbound(index, UnboundCapture(name))),
            Err(e) => Err(self.fail(index, FailureKind::EvalFailed, None, None, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        directive::{extract_groups, DEFAULT_COMMENT_PREFIXES},
        header::parse_group_name,
    };

    fn group(directives: &[&str]) -> CheckGroup {
        let mut text = String::from("/// CHECK-START: int Main.f() gvn (after)\n");
        for directive in directives {
            text.push_str("/// ");
            text.push_str(directive);
            text.push('\n');
        }
        let prefixes: Vec<String> = DEFAULT_COMMENT_PREFIXES.iter().map(|p| p.to_string()).collect();
        extract_groups("Main.java", &text, &prefixes)
            .unwrap()
            .remove(0)
    }

    fn block(lines: &[&str]) -> OutputBlock {
        OutputBlock::new(
            parse_group_name("int Main.f() gvn (after)").unwrap(),
            lines.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn eval(directives: &[&str], lines: &[&str]) -> GroupOutcome {
        evaluate_group(&group(directives), &block(lines), &IsaFeatures::default(), None)
    }

    fn failure(outcome: &GroupOutcome) -> &Failure {
        outcome.failure().expect("group should fail")
    }

    #[test]
    fn test_capture_and_backref() {
        let outcome = eval(
            &["CHECK: <<C:i\\d+>> IntConstant 1", "CHECK: Return [<<C>>]"],
            &["i3 IntConstant 1", "Return [i3]"],
        );
        let GroupOutcome::Passed { bindings, trace } = outcome else {
            panic!("expected pass: {:?}", outcome);
        };
        assert_eq!(bindings.get("C").map(String::as_str), Some("i3"));
        assert_eq!(trace, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_not_found_reports_nearest_miss() {
        let outcome = eval(
            &["CHECK: <<C:i\\d+>> IntConstant 1", "CHECK: Return [<<C>>]"],
            &["i3 IntConstant 2", "Return [i3]"],
        );
        let failure = failure(&outcome);
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert_eq!(failure.directive.as_ref().unwrap().location.line, 2);
        assert_eq!(failure.window, Some(Window::new(0, 2)));
        let miss = failure.nearest_miss.as_ref().unwrap();
        assert_eq!(miss.index, 0);
        assert_eq!(miss.dump_line, 1);
        assert_eq!(miss.matched_segments, 4);
    }

    #[test]
    fn test_next_must_be_adjacent() {
        let passed = eval(&["CHECK: Add", "CHECK-NEXT: Sub"], &["Add", "Sub"]);
        assert!(passed.is_passed());
        let failed = eval(&["CHECK: Add", "CHECK-NEXT: Sub"], &["Add", "Mul", "Sub"]);
        assert_eq!(failure(&failed).window, Some(Window::new(1, 2)));
    }

    #[test]
    fn test_next_at_block_end() {
        let outcome = eval(&["CHECK: Add", "CHECK-NEXT: Sub"], &["Add"]);
        assert_eq!(failure(&outcome).kind, FailureKind::NotFound);
    }

    #[test]
    fn test_same_continues_on_matched_line() {
        let outcome = eval(
            &["CHECK: InvokeVirtual", "CHECK-SAME: intrinsic:StringEquals"],
            &["z5 InvokeVirtual [l1,l2] intrinsic:StringEquals", "Return [z5]"],
        );
        let GroupOutcome::Passed { trace, .. } = outcome else {
            panic!("expected pass");
        };
        assert_eq!(trace, vec![Some(0), Some(0)]);

        let outcome = eval(
            &["CHECK: intrinsic:StringEquals", "CHECK-SAME: InvokeVirtual"],
            &["z5 InvokeVirtual [l1,l2] intrinsic:StringEquals"],
        );
        assert_eq!(failure(&outcome).kind, FailureKind::NotFound);
    }

    #[test]
    fn test_not_between_anchors() {
        let outcome = eval(
            &["CHECK: ParameterValue", "CHECK-NOT: InvokeStaticOrDirect", "CHECK: Return"],
            &["l1 ParameterValue", "z2 InvokeStaticOrDirect", "Return [z2]"],
        );
        let failure = failure(&outcome);
        assert_eq!(failure.kind, FailureKind::ForbiddenMatchFound);
        assert_eq!(failure.window, Some(Window::new(1, 2)));
        assert_eq!(failure.nearest_miss.as_ref().unwrap().index, 1);
    }

    #[test]
    fn test_not_outside_window_is_fine() {
        let outcome = eval(
            &["CHECK: ParameterValue", "CHECK-NOT: InvokeStaticOrDirect", "CHECK: Return"],
            &["l1 ParameterValue", "Return [l1]", "z2 InvokeStaticOrDirect"],
        );
        assert!(outcome.is_passed());
    }

    #[test]
    fn test_trailing_not_runs_to_block_end() {
        let outcome = eval(
            &["CHECK: Return", "CHECK-NOT: Goto"],
            &["Return [i1]", "Exit", "Goto"],
        );
        assert_eq!(failure(&outcome).window, Some(Window::new(1, 3)));
    }

    #[test]
    fn test_leading_not_covers_whole_block() {
        let outcome = eval(&["CHECK-NOT: InvokeStaticOrDirect"], &["i1 IntConstant 1", "Return [i1]"]);
        assert!(outcome.is_passed());
    }

    #[test]
    fn test_not_uses_bindings() {
        let outcome = eval(
            &["CHECK: <<A:i\\d+>> Add", "CHECK-NOT: Mul [<<A>>", "CHECK: Return"],
            &["i1 Add [p0,p1]", "i2 Mul [i9,i1]", "Return [i2]"],
        );
        assert!(outcome.is_passed());
    }

    #[test]
    fn test_dag_any_order() {
        let outcome = eval(
            &["CHECK-DAG: Add", "CHECK-DAG: Sub", "CHECK-DAG: Mul", "CHECK: Return"],
            &["Mul", "Sub", "Add", "Return"],
        );
        let GroupOutcome::Passed { trace, .. } = outcome else {
            panic!("expected pass");
        };
        assert_eq!(trace, vec![Some(2), Some(1), Some(0), Some(3)]);
    }

    #[test]
    fn test_dag_prefers_lines_before_next_check() {
        let outcome = eval(
            &["CHECK-DAG: <<X:i\\d+>> Load", "CHECK-DAG: Use [<<X>>]", "CHECK: Return"],
            &["i1 Load", "i2 Load", "Use [i2]", "Return", "Use [i1]"],
        );
        let GroupOutcome::Passed { bindings, trace } = outcome else {
            panic!("expected pass: {:?}", outcome);
        };
        assert_eq!(bindings.get("X").map(String::as_str), Some("i2"));
        assert_eq!(trace, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_dag_shares_pattern_with_next_check() {
        let outcome = eval(
            &["CHECK-DAG: InvokeStaticOrDirect", "CHECK: InvokeStaticOrDirect"],
            &["i1 InvokeStaticOrDirect a", "i2 InvokeStaticOrDirect b"],
        );
        let GroupOutcome::Passed { trace, .. } = outcome else {
            panic!("expected pass: {:?}", outcome);
        };
        assert_eq!(trace, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_next_check_must_follow_dag_run() {
        let outcome = eval(
            &["CHECK-DAG: Add", "CHECK-DAG: Sub", "CHECK: Return"],
            &["Add", "Return", "Sub"],
        );
        let failure = failure(&outcome);
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert_eq!(failure.directive.as_ref().unwrap().text, "Return");
        assert_eq!(failure.window, Some(Window::new(3, 3)));
        assert!(failure.nearest_miss.is_none());
    }

    #[test]
    fn test_dag_unsatisfiable_reports_whole_block() {
        let outcome = eval(
            &["CHECK-DAG: Add", "CHECK-DAG: Mul", "CHECK: Return"],
            &["Add", "Return", "Sub"],
        );
        let failure = failure(&outcome);
        assert_eq!(failure.kind, FailureKind::DagUnsatisfiable);
        assert_eq!(failure.directive.as_ref().unwrap().text, "Mul");
        assert_eq!(failure.window, Some(Window::new(0, 3)));
    }

    #[test]
    fn test_dag_captures_feed_later_lines() {
        let outcome = eval(
            &[
                "CHECK-DAG: <<A:i\\d+>> IntConstant 1",
                "CHECK-DAG: <<B:i\\d+>> IntConstant 2",
                "CHECK: Add [<<A>>,<<B>>]",
            ],
            &["i2 IntConstant 2", "i1 IntConstant 1", "i3 Add [i1,i2]"],
        );
        assert!(outcome.is_passed());
    }

    #[test]
    fn test_unbound_reference() {
        let outcome = eval(&["CHECK: Return [<<C>>]"], &["Return [i3]"]);
        assert_eq!(failure(&outcome).kind, FailureKind::UnboundCaptureReference);
    }

    #[test]
    fn test_eval() {
        let directives = [
            "CHECK: ldr w0, [sp, #<<Off1:\\d+>>]",
            "CHECK: ldr w1, [sp, #<<Off2:\\d+>>]",
            "CHECK-EVAL: <<Off1>> + 4 == <<Off2>>",
        ];
        let passed = eval(&directives, &["ldr w0, [sp, #12]", "ldr w1, [sp, #16]"]);
        assert!(passed.is_passed());
        let failed = eval(&directives, &["ldr w0, [sp, #12]", "ldr w1, [sp, #20]"]);
        assert_eq!(failure(&failed).kind, FailureKind::EvalFailed);
    }

    #[test]
    fn test_eval_isa_feature() {
        let group = group(&["CHECK-EVAL: hasIsaFeature(\"sve\")"]);
        let block = block(&[]);
        let outcome = evaluate_group(&group, &block, &IsaFeatures::parse("sve"), None);
        assert!(outcome.is_passed());
        let outcome = evaluate_group(&group, &block, &IsaFeatures::parse("-sve"), None);
        assert_eq!(failure(&outcome).kind, FailureKind::EvalFailed);
    }

    #[test]
    fn test_empty_group_passes() {
        assert!(eval(&[], &["anything"]).is_passed());
    }

    #[test]
    fn test_expired_deadline() {
        let outcome = evaluate_group(
            &group(&["CHECK: Add"]),
            &block(&["Add"]),
            &IsaFeatures::default(),
            Some(Instant::now()),
        );
        assert_eq!(failure(&outcome).kind, FailureKind::MatchTimeout);
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let outcome = eval(
            &["CHECK: Add", "CHECK: Add", "CHECK: Sub"],
            &["Add", "Sub", "Add", "Sub"],
        );
        let GroupOutcome::Passed { trace, .. } = outcome else {
            panic!("expected pass");
        };
        assert_eq!(trace, vec![Some(0), Some(2), Some(3)]);
    }
}
