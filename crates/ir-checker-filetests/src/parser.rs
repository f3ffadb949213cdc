//! Test file parsing
//!
//! A `.chk` file starts with a `test` command line, followed by one or more
//! cases:
//!
//! ```text
//! test check arch=ARM64
//!
//! source:
//! /// CHECK-START: int Main.f() gvn (after)
//! /// CHECK: Add
//! dump:
//! begin_compilation
//! ...
//! expect: pass
//! ```
//!
//! Lines starting with `;` outside of `source:`/`dump:` sections are comments.

/// A test case extracted from a test file
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    /// The test command line, e.g. `test check arch=ARM64`
    pub command: String,
    /// 1-based line of the `source:` marker in the test file
    pub line: usize,
    /// Test source with directives, verbatim
    pub source_text: String,
    /// Compiler dump, verbatim
    pub dump_text: String,
    /// Text after each `expect:` marker
    pub expectations: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Source,
    Dump,
}

/// Parse a test file into its cases
pub fn parse_test_file(content: &str) -> Vec<TestCase> {
    let lines: Vec<&str> = content.lines().collect();
    let mut test_cases = Vec::new();
    let mut i = 0;

    // Parse test command from header
    let mut command = String::new();
    while i < lines.len() {
        let line = lines[i].trim();
        i += 1;
        if line.starts_with("test ") {
            command = String::from(line);
            break;
        }
    }

    let mut current: Option<TestCase> = None;
    let mut source: Vec<&str> = Vec::new();
    let mut dump: Vec<&str> = Vec::new();
    let mut section = Section::None;

    while i < lines.len() {
        let raw = lines[i];
        let line = raw.trim();
        i += 1;

        if line == "source:" {
            if let Some(case) = current.take() {
                test_cases.push(finish(case, &source, &dump));
            }
            source.clear();
            dump.clear();
            current = Some(TestCase {
                command: command.clone(),
                line: i,
                ..TestCase::default()
            });
            section = Section::Source;
            continue;
        }
        if line == "dump:" && current.is_some() {
            section = Section::Dump;
            continue;
        }
        if let Some(expectation) = line.strip_prefix("expect:") {
            if let Some(case) = current.as_mut() {
                case.expectations.push(String::from(expectation.trim()));
            }
            section = Section::None;
            continue;
        }

        match section {
            Section::Source => source.push(raw),
            Section::Dump => dump.push(raw),
            Section::None => {}
        }
    }

    if let Some(case) = current.take() {
        test_cases.push(finish(case, &source, &dump));
    }

    test_cases
}

fn finish(mut case: TestCase, source: &[&str], dump: &[&str]) -> TestCase {
    case.source_text = join(source);
    case.dump_text = join(dump);
    case
}

fn join(lines: &[&str]) -> String {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Split a command line into its name and `key=value` options
pub fn parse_command(command: &str) -> (String, Vec<(String, String)>) {
    let mut words = command.split_whitespace();
    // Skip the leading `test`
    words.next();
    let name = words.next().map(String::from).unwrap_or_default();
    let options = words
        .filter_map(|w| w.split_once('='))
        .map(|(k, v)| (String::from(k), String::from(v)))
        .collect();
    (name, options)
}
