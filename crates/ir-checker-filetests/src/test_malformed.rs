//! The `malformed` subtest - inputs that must abort the checker run
//!
//! Each case has exactly one `expect:` line:
//! - `directive <line> <message>`: a malformed directive at source line
//!   `<line>` whose error message contains `<message>`
//! - `output <line>`: a malformed dump at dump line `<line>`

use ir_checker::{check, CheckerConfig, CheckerError};

use crate::parser::{parse_command, parse_test_file, TestCase};

/// Run tests from malformed test files
#[allow(dead_code)]
pub fn run_tests_from_file(content: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let test_cases = parse_test_file(content);

    assert!(!test_cases.is_empty(), "No test cases found in test file");

    for case in test_cases {
        let (name, _) = parse_command(&case.command);
        assert_eq!(name, "malformed", "Unexpected test command: {}", case.command);
        run_malformed_test(&case);
    }
}

/// Run a single malformed test
#[allow(dead_code)]
fn run_malformed_test(case: &TestCase) {
    assert_eq!(
        case.expectations.len(),
        1,
        "Malformed test at line {} needs exactly one expectation",
        case.line
    );
    let expectation = &case.expectations[0];

    let err = match check("source", &case.source_text, &case.dump_text, &CheckerConfig::new()) {
        Ok(report) => panic!(
            "Malformed test at line {}: expected an error but the run completed\n\n{}",
            case.line, report
        ),
        Err(e) => e,
    };

    let (what, rest) = expectation
        .split_once(' ')
        .unwrap_or((expectation.as_str(), ""));
    let (line, message) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
    let line: usize = line
        .parse()
        .unwrap_or_else(|_| panic!("Bad line number in expectation '{}'", expectation));

    match (what, &err) {
        ("directive", CheckerError::MalformedDirective(malformed)) => {
            assert_eq!(
                malformed.location.line, line,
                "Malformed test at line {}: {}",
                case.line, err
            );
            assert!(
                err.to_string().contains(message.trim()),
                "Malformed test at line {}: '{}' does not mention '{}'",
                case.line,
                err,
                message.trim()
            );
        }
        ("output", CheckerError::MalformedOutput(output)) => {
            assert_eq!(output.line, line, "Malformed test at line {}: {}", case.line, err);
        }
        _ => panic!(
            "Malformed test at line {}: expected '{}', got: {}",
            case.line, expectation, err
        ),
    }
}
