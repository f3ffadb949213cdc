//! The `check` subtest - runs a source against a dump and compares group outcomes
//!
//! Each `expect:` line describes one group, in source order:
//! - `pass`, optionally followed by `Name=value` bindings
//! - `fail <FailureKind>`, optionally followed by `at <line>` (source line of
//!   the failing directive)
//! - `skip`

use ir_checker::{check, Arch, CheckerConfig, FailureKind, GroupOutcome, Report};

use crate::parser::{parse_command, parse_test_file, TestCase};

const FAILURE_KINDS: [FailureKind; 7] = [
    FailureKind::NotFound,
    FailureKind::ForbiddenMatchFound,
    FailureKind::DagUnsatisfiable,
    FailureKind::UnboundCaptureReference,
    FailureKind::EvalFailed,
    FailureKind::MatchTimeout,
    FailureKind::MissingOutputBlock,
];

/// Run tests from check test files
#[allow(dead_code)]
pub fn run_tests_from_file(content: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let test_cases = parse_test_file(content);

    assert!(!test_cases.is_empty(), "No test cases found in test file");

    for case in test_cases {
        let (name, options) = parse_command(&case.command);
        assert_eq!(name, "check", "Unexpected test command: {}", case.command);
        let config = config_for(&options);
        log::debug!("check case at line {}", case.line);
        run_check_test(&case, &config);
    }
}

fn config_for(options: &[(String, String)]) -> CheckerConfig {
    let mut config = CheckerConfig::new();
    for (key, value) in options {
        config = match key.as_str() {
            "arch" => config.with_arch(
                value
                    .parse::<Arch>()
                    .unwrap_or_else(|e| panic!("bad arch option: {}", e)),
            ),
            "jobs" => config.with_concurrency(value.parse().expect("bad jobs option")),
            other => panic!("Unknown option '{}'", other),
        };
    }
    config
}

fn failure_kind(name: &str) -> FailureKind {
    FAILURE_KINDS
        .into_iter()
        .find(|k| k.to_string() == name)
        .unwrap_or_else(|| panic!("Unknown failure kind '{}'", name))
}

/// Run a single check test
#[allow(dead_code)]
fn run_check_test(case: &TestCase, config: &CheckerConfig) {
    let report = check("source", &case.source_text, &case.dump_text, config).unwrap_or_else(|e| {
        panic!(
            "Check test at line {} failed with a fatal error: {}\n\nSource:\n{}",
            case.line, e, case.source_text
        )
    });

    assert_eq!(
        report.groups.len(),
        case.expectations.len(),
        "Check test at line {}: {} groups but {} expectations\n\n{}",
        case.line,
        report.groups.len(),
        case.expectations.len(),
        report
    );

    for (index, expectation) in case.expectations.iter().enumerate() {
        check_expectation(case, &report, index, expectation);
    }
}

fn check_expectation(case: &TestCase, report: &Report, index: usize, expectation: &str) {
    let group = &report.groups[index];
    let mut words = expectation.split_whitespace();
    let verdict = words.next().unwrap_or_default();
    let context = || {
        format!(
            "Check test at line {}, group {} ({}): expected '{}'\n\n{}",
            case.line, index, group.key, expectation, report
        )
    };

    match (verdict, &group.outcome) {
        ("pass", GroupOutcome::Passed { bindings, .. }) => {
            for binding in words {
                let (name, value) = binding
                    .split_once('=')
                    .unwrap_or_else(|| panic!("Bad binding '{}' in expectation", binding));
                assert_eq!(
                    bindings.get(name).map(String::as_str),
                    Some(value),
                    "{}",
                    context()
                );
            }
        }
        ("fail", GroupOutcome::Failed { failure }) => {
            let kind = failure_kind(words.next().unwrap_or_default());
            assert_eq!(failure.kind, kind, "{}", context());
            if words.next() == Some("at") {
                let line: usize = words
                    .next()
                    .and_then(|l| l.parse().ok())
                    .expect("expected a line number after 'at'");
                let actual = failure.directive.as_ref().map(|d| d.location.line);
                assert_eq!(actual, Some(line), "{}", context());
            }
        }
        ("skip", GroupOutcome::Skipped { .. }) => {}
        _ => panic!("{}", context()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_basic() {
        let content = include_str!("../filetests/check/basic.chk");
        run_tests_from_file(content);
    }

    #[test]
    fn test_check_not() {
        let content = include_str!("../filetests/check/not.chk");
        run_tests_from_file(content);
    }

    #[test]
    fn test_check_dag() {
        let content = include_str!("../filetests/check/dag.chk");
        run_tests_from_file(content);
    }

    #[test]
    fn test_check_eval() {
        let content = include_str!("../filetests/check/eval.chk");
        run_tests_from_file(content);
    }

    #[test]
    fn test_check_arch() {
        let content = include_str!("../filetests/check/arch.chk");
        run_tests_from_file(content);
    }

    #[test]
    fn test_check_arch_override() {
        let content = include_str!("../filetests/check/arch-override.chk");
        run_tests_from_file(content);
    }
}
