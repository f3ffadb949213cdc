//! Checker entry points: extraction, architecture filtering and parallel
//! group evaluation.

use std::time::Instant;

use rayon::{prelude::*, ThreadPoolBuilder};

use crate::{
    arch::Arch,
    config::CheckerConfig,
    directive::{extract_groups, CheckGroup},
    error::CheckerResult,
    matcher::evaluate_group,
    output::{parse_dump, Dump, OutputBlock},
    report::{Failure, FailureKind, GroupOutcome, GroupReport, Report, SkipReason},
};

/// Check the directives in `source` against the compiler dump `dump`.
///
/// Malformed directives and unreadable dumps abort the run. Everything else
/// ends up in the returned [`Report`].
pub fn check(
    source_name: &str,
    source: &str,
    dump: &str,
    config: &CheckerConfig,
) -> CheckerResult<Report> {
    let groups = extract_groups(source_name, source, config.comment_prefixes())?;
    let dump = parse_dump(dump)?;
    log::debug!(
        "{}: {} groups, {} dump blocks",
        source_name,
        groups.len(),
        dump.blocks().len()
    );
    check_groups(source_name, &groups, &dump, config)
}

/// Work item for one group.
enum Task<'a> {
    Evaluate(&'a CheckGroup, &'a OutputBlock),
    Done(GroupOutcome),
}

/// Check already extracted groups against an already parsed dump.
pub fn check_groups(
    source_name: &str,
    groups: &[CheckGroup],
    dump: &Dump,
    config: &CheckerConfig,
) -> CheckerResult<Report> {
    let selected = config.arch().or(dump.arch);
    let tasks: Vec<Task<'_>> = groups.iter().map(|g| plan(g, dump, selected)).collect();

    let run = |task: &Task<'_>| -> GroupOutcome {
        match task {
            Task::Evaluate(group, block) => {
                log::debug!("evaluating {} ({})", group.key, group.location);
                let deadline = config.timeout().map(|t| Instant::now() + t);
                let outcome = evaluate_group(group, block, &dump.isa_features, deadline);
                log::debug!(
                    "{} {}",
                    group.key,
                    if outcome.is_passed() { "passed" } else { "failed" }
                );
                outcome
            }
            Task::Done(outcome) => outcome.clone(),
        }
    };

    let outcomes: Vec<GroupOutcome> = if config.concurrency() <= 1 {
        tasks.iter().map(run).collect()
    } else {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.concurrency())
            .build()?;
        pool.install(|| tasks.par_iter().map(run).collect())
    };

    let report = Report {
        source: source_name.to_string(),
        arch: selected,
        groups: groups
            .iter()
            .zip(outcomes)
            .map(|(group, outcome)| GroupReport {
                key: group.key.clone(),
                location: group.location.clone(),
                outcome,
            })
            .collect(),
    };
    log::info!(
        "{}: {} passed, {} failed, {} skipped",
        source_name,
        report.passed(),
        report.failed(),
        report.skipped()
    );
    Ok(report)
}

/// Decide what happens to `group` before any matching starts.
fn plan<'a>(group: &'a CheckGroup, dump: &'a Dump, selected: Option<Arch>) -> Task<'a> {
    if let Some(tag) = group.key.arch {
        if selected != Some(tag) {
            log::debug!("skipping {}: {} not selected", group.key, tag);
            return Task::Done(GroupOutcome::Skipped {
                reason: SkipReason::ArchMismatch {
                    group: tag,
                    selected,
                },
            });
        }
    }

    match dump.find(&group.key.name) {
        Some(block) => Task::Evaluate(group, block),
        None => Task::Done(GroupOutcome::Failed {
            failure: Failure {
                kind: FailureKind::MissingOutputBlock,
                directive: None,
                block: group.key.name.clone(),
                window: None,
                nearest_miss: None,
                bindings: Default::default(),
                message: format!("dump has no block '{}'", group.key.name),
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_group_name;

    fn dump_with(name: &str, lines: &[&str]) -> Dump {
        Dump::from_blocks(vec![OutputBlock::new(
            parse_group_name(name).unwrap(),
            lines.iter().map(|s| s.to_string()).collect(),
        )])
    }

    fn groups(text: &str) -> Vec<CheckGroup> {
        extract_groups("Main.java", text, CheckerConfig::new().comment_prefixes()).unwrap()
    }

    #[test]
    fn test_missing_block() {
        let groups = groups("/// CHECK-START: int Main.g() gvn (after)\n/// CHECK: Add\n");
        let dump = dump_with("int Main.f() gvn (after)", &["Add"]);
        let report = check_groups("Main.java", &groups, &dump, &CheckerConfig::new()).unwrap();
        let (_, failure) = report.failures().next().unwrap();
        assert_eq!(failure.kind, FailureKind::MissingOutputBlock);
        assert!(failure.directive.is_none());
    }

    #[test]
    fn test_unselected_arch_is_skipped() {
        let groups = groups("/// CHECK-START-ARM: int Main.f() gvn (after)\n/// CHECK: Mul\n");
        let dump = dump_with("int Main.f() gvn (after)", &["Add"]);
        let report = check_groups("Main.java", &groups, &dump, &CheckerConfig::new()).unwrap();
        assert_eq!(report.skipped(), 1);
        assert!(report.is_success());
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let text = "/// CHECK-START: int Main.f() gvn (after)\n/// CHECK: Add\n\
                    /// CHECK-START: int Main.f() gvn (after)\n/// CHECK: Mul\n\
                    /// CHECK-START: int Main.f() gvn (after)\n/// CHECK-DAG: Sub\n/// CHECK-DAG: Add\n";
        let groups = groups(text);
        let dump = dump_with("int Main.f() gvn (after)", &["Add", "Sub"]);
        let sequential = CheckerConfig::new().with_concurrency(1);
        let parallel = CheckerConfig::new().with_concurrency(4);
        let a = check_groups("Main.java", &groups, &dump, &sequential).unwrap();
        let b = check_groups("Main.java", &groups, &dump, &parallel).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.passed(), a.failed()), (2, 1));
    }
}
