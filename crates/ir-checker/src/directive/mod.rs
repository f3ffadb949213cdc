//! Extraction of check groups from annotated test sources.
//!
//! Directives live in comments:
//!
//! ```text
//! /// CHECK-START: boolean Main.stringEqualsSame() instruction_simplifier (before)
//! /// CHECK:      InvokeStaticOrDirect
//!
//! /// CHECK-START: boolean Main.stringEqualsSame() register (before)
//! /// CHECK:      <<Const1:i\d+>> IntConstant 1
//! /// CHECK-NEXT:                 Return [<<Const1>>]
//! ```
//!
//! Every `CHECK-START` opens a group; the directive lines after it belong to
//! that group until the next header.

mod keyword;

use core::fmt;

use serde::Serialize;

use crate::{
    error::{DirectiveError, MalformedDirective, SourceLocation},
    expr::Expr,
    header::{parse_group_name, GroupKey},
    pattern::Pattern,
};

use self::keyword::{parse_keyword, Keyword};

/// Kind of a directive line inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckKind {
    /// `CHECK:`
    Match,
    /// `CHECK-NEXT:`
    Next,
    /// `CHECK-SAME:`
    Same,
    /// `CHECK-NOT:`
    Not,
    /// `CHECK-DAG:`
    Dag,
    /// `CHECK-EVAL:`
    Eval,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Match => "CHECK",
            CheckKind::Next => "CHECK-NEXT",
            CheckKind::Same => "CHECK-SAME",
            CheckKind::Not => "CHECK-NOT",
            CheckKind::Dag => "CHECK-DAG",
            CheckKind::Eval => "CHECK-EVAL",
        }
    }

    /// Kinds that fix a position in the output and can be followed by
    /// `CHECK-NEXT` or `CHECK-SAME`.
    pub fn is_anchor(self) -> bool {
        matches!(self, CheckKind::Match | CheckKind::Next | CheckKind::Same)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled body of a directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckBody {
    Pattern(Pattern),
    Expr(Expr),
}

/// One directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLine {
    pub kind: CheckKind,
    /// Directive text after the colon.
    pub text: String,
    pub body: CheckBody,
    pub location: SourceLocation,
}

impl CheckLine {
    pub fn pattern(&self) -> Option<&Pattern> {
        match &self.body {
            CheckBody::Pattern(p) => Some(p),
            CheckBody::Expr(_) => None,
        }
    }
}

/// All directives under one `CHECK-START` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckGroup {
    pub key: GroupKey,
    /// Location of the header line.
    pub location: SourceLocation,
    pub lines: Vec<CheckLine>,
}

/// Default comment prefixes: Java/Smali tests use `///`, assembly tests `##`.
pub const DEFAULT_COMMENT_PREFIXES: [&str; 2] = ["///", "##"];

/// Comment text of `line`, if it starts with one of `prefixes`.
fn comment_text<'a>(line: &'a str, prefixes: &[String]) -> Option<&'a str> {
    let line = line.trim_start();
    prefixes
        .iter()
        .filter(|p| !p.is_empty() && line.starts_with(p.as_str()))
        .max_by_key(|p| p.len())
        .map(|p| line[p.len()..].trim())
}

fn compile_line(kind: CheckKind, body: &str) -> Result<CheckBody, DirectiveError> {
    if kind == CheckKind::Eval {
        return Ok(CheckBody::Expr(Expr::parse(body)?));
    }
    let pattern = Pattern::parse(body)?;
    if kind == CheckKind::Not {
        if let Some(name) = pattern.defined_names().next() {
            return Err(DirectiveError::CaptureInNot(name.to_string()));
        }
    }
    Ok(CheckBody::Pattern(pattern))
}

/// Parse the directives of a test source into groups, in source order.
///
/// `source_name` only labels locations. Stops at the first malformed directive.
pub fn extract_groups(
    source_name: &str,
    text: &str,
    prefixes: &[String],
) -> Result<Vec<CheckGroup>, MalformedDirective> {
    let mut groups: Vec<CheckGroup> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let Some(comment) = comment_text(line, prefixes) else {
            continue;
        };
        let location = SourceLocation {
            file: source_name.to_string(),
            line: index + 1,
        };
        let malformed = |reason: DirectiveError| MalformedDirective {
            location: location.clone(),
            text: comment.to_string(),
            reason,
        };

        let Some((keyword, body)) = parse_keyword(comment).map_err(malformed)? else {
            continue;
        };

        match keyword {
            Keyword::Start(arch) => {
                let name = parse_group_name(body).map_err(|e| malformed(e.into()))?;
                log::trace!("{}: group '{}'", location, name);
                groups.push(CheckGroup {
                    key: GroupKey { name, arch },
                    location: location.clone(),
                    lines: Vec::new(),
                });
            }
            Keyword::Line(kind) => {
                let group = groups
                    .last_mut()
                    .ok_or_else(|| malformed(DirectiveError::OutsideGroup))?;
                if matches!(kind, CheckKind::Next | CheckKind::Same) {
                    let anchored = group.lines.last().is_some_and(|l| l.kind.is_anchor());
                    if !anchored {
                        return Err(malformed(DirectiveError::MissingAnchor(kind)));
                    }
                }
                let compiled = compile_line(kind, body).map_err(malformed)?;
                group.lines.push(CheckLine {
                    kind,
                    text: body.to_string(),
                    body: compiled,
                    location: location.clone(),
                });
            }
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arch::Arch, header::Phase, pattern::PatternError};

    fn prefixes() -> Vec<String> {
        DEFAULT_COMMENT_PREFIXES.iter().map(|p| p.to_string()).collect()
    }

    fn extract(text: &str) -> Result<Vec<CheckGroup>, MalformedDirective> {
        extract_groups("Main.java", text, &prefixes())
    }

    const SOURCE: &str = r#"
public class Main {

  /// CHECK-START: boolean Main.stringEqualsSame() instruction_simplifier (before)
  /// CHECK:      InvokeStaticOrDirect

  /// CHECK-START: boolean Main.stringEqualsSame() register (before)
  /// CHECK:      <<Const1:i\d+>> IntConstant 1
  /// CHECK-NEXT:                 Return [<<Const1>>]

  /// CHECK-START: boolean Main.stringEqualsSame() register (before)
  /// CHECK-NOT:  InvokeStaticOrDirect

  public static boolean stringEqualsSame() {
    return $inline$callStringEquals("obj", "obj");
  }

  /// CHECK-START-ARM64: boolean Main.stringEqualsNull() disassembly (after)
  /// CHECK:          InvokeVirtual
  /// CHECK-EVAL:     <<Offset>> == 0
}
"#;

    #[test]
    fn test_extract_groups_in_source_order() {
        let groups = extract(SOURCE).unwrap();
        assert_eq!(groups.len(), 4);

        let first = &groups[0];
        assert_eq!(first.key.name.method, "boolean Main.stringEqualsSame()");
        assert_eq!(first.key.name.pass, "instruction_simplifier");
        assert_eq!(first.key.name.phase, Phase::Before);
        assert_eq!(first.key.arch, None);
        assert_eq!(first.location.line, 4);
        assert_eq!(first.lines.len(), 1);

        let second = &groups[1];
        assert_eq!(
            second.lines.iter().map(|l| l.kind).collect::<Vec<_>>(),
            vec![CheckKind::Match, CheckKind::Next]
        );
        assert_eq!(second.lines[1].text, "Return [<<Const1>>]");
        assert_eq!(second.lines[1].location.line, 9);

        // Same key twice: kept as two separate groups.
        assert_eq!(groups[2].key, groups[1].key);

        assert_eq!(groups[3].key.arch, Some(Arch::Arm64));
        assert!(matches!(groups[3].lines[1].body, CheckBody::Expr(_)));
    }

    #[test]
    fn test_hash_prefix() {
        let text = "## CHECK-START: int Main.f() gvn (after)\n## CHECK: Add\n# CHECK: ignored\n";
        let groups = extract(text).unwrap();
        assert_eq!(groups[0].lines.len(), 1);
    }

    #[test]
    fn test_custom_prefixes() {
        let text = "// CHECK-START: int Main.f() gvn (after)\n// CHECK: Add\n";
        let groups = extract_groups("t.c", text, &["//".to_string()]).unwrap();
        assert_eq!(groups[0].lines.len(), 1);
        assert!(extract(text).unwrap().is_empty());
    }

    #[test]
    fn test_prose_comments_are_ignored() {
        let text = "/// CHECK-START: int Main.f() gvn (after)\n/// Checks below are brittle.\n/// CHECK: Add\n";
        assert_eq!(extract(text).unwrap()[0].lines.len(), 1);
    }

    #[test]
    fn test_directive_outside_group() {
        let err = extract("/// CHECK: Add\n").unwrap_err();
        assert_eq!(err.reason, DirectiveError::OutsideGroup);
        assert_eq!(err.location.line, 1);
        assert_eq!(err.text, "CHECK: Add");
    }

    #[test]
    fn test_next_needs_anchor() {
        let err = extract("/// CHECK-START: int Main.f() gvn (after)\n/// CHECK-NEXT: Add\n")
            .unwrap_err();
        assert_eq!(err.reason, DirectiveError::MissingAnchor(CheckKind::Next));

        let err = extract(
            "/// CHECK-START: int Main.f() gvn (after)\n/// CHECK: Add\n/// CHECK-DAG: Sub\n/// CHECK-SAME: Mul\n",
        )
        .unwrap_err();
        assert_eq!(err.reason, DirectiveError::MissingAnchor(CheckKind::Same));
        assert_eq!(err.location.line, 4);
    }

    #[test]
    fn test_capture_in_not() {
        let err = extract("/// CHECK-START: int Main.f() gvn (after)\n/// CHECK-NOT: <<X:\\w+>> Add\n")
            .unwrap_err();
        assert_eq!(err.reason, DirectiveError::CaptureInNot("X".to_string()));
    }

    #[test]
    fn test_bad_header() {
        let err = extract("/// CHECK-START: int Main.f() gvn\n").unwrap_err();
        assert!(matches!(err.reason, DirectiveError::Header(_)));
    }

    #[test]
    fn test_bad_pattern() {
        let err = extract("/// CHECK-START: int Main.f() gvn (after)\n/// CHECK: <<X:a\n")
            .unwrap_err();
        assert!(matches!(
            err.reason,
            DirectiveError::Pattern(PatternError::Unterminated(_))
        ));
    }

    #[test]
    fn test_bad_expression() {
        let err = extract("/// CHECK-START: int Main.f() gvn (after)\n/// CHECK-EVAL: 1 +\n")
            .unwrap_err();
        assert!(matches!(err.reason, DirectiveError::Expr(_)));
    }

    #[test]
    fn test_empty_group() {
        let groups = extract("/// CHECK-START: int Main.f() gvn (after)\n").unwrap();
        assert!(groups[0].lines.is_empty());
    }
}
