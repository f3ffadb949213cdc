//! Compilation of directive text into matchable segment sequences.
//!
//! A pattern line mixes:
//! - literal text, matched verbatim
//! - `{{regex}}` fragments
//! - `<<Name:regex>>` captures, binding `Name` to the matched text
//! - `<<Name>>` back-references to an already bound capture
//! - whitespace runs, which require whitespace in the output but allow any
//!   further words in between
//!
//! Segments are turned into one `regex::Regex` per evaluation attempt, since
//! back-references substitute values bound by earlier lines.

mod parser;

use std::fmt::Write as _;

use regex::Regex;

use crate::bindings::Bindings;

pub(crate) use parser::variable_name;

/// One piece of a compiled pattern line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// Whitespace in the directive text.
    Separator,
    /// Unnamed `{{regex}}` fragment.
    Regex(String),
    /// `<<Name:regex>>`.
    Capture { name: String, regex: String },
    /// `<<Name>>`.
    BackRef(String),
}

/// Errors found while compiling pattern text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("unterminated '{0}'")]
    Unterminated(&'static str),
    #[error("invalid capture name '{0}'")]
    InvalidName(String),
    #[error("empty regex")]
    EmptyRegex,
    #[error("invalid regex '{regex}': {message}")]
    InvalidRegex { regex: String, message: String },
    #[error("capture '{0}' is defined twice on the same line")]
    DuplicateCapture(String),
    #[error("capture '{0}' is referenced on the line that defines it")]
    SameLineReference(String),
}

/// A back-reference named a capture that has not been bound yet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("capture '{0}' is referenced before it is bound")]
pub struct UnboundCapture(pub String);

/// A compiled pattern line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile pattern text.
    pub fn parse(text: &str) -> Result<Pattern, PatternError> {
        let segments = parser::parse_segments(text)?;
        if segments.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut defined: Vec<&str> = Vec::new();
        for segment in &segments {
            match segment {
                Segment::Capture { name, .. } => {
                    if defined.contains(&name.as_str()) {
                        return Err(PatternError::DuplicateCapture(name.clone()));
                    }
                    defined.push(name);
                }
                Segment::BackRef(name) if defined.contains(&name.as_str()) => {
                    return Err(PatternError::SameLineReference(name.clone()));
                }
                _ => {}
            }
        }

        let pattern = Pattern { segments };
        // Fragments compile on their own; make sure their concatenation does too.
        let probe = pattern.regex_source(pattern.segments.len(), &Bindings::new(), true);
        if let Ok((source, _, _)) = probe {
            Regex::new(&source).map_err(|e| PatternError::InvalidRegex {
                regex: source.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(pattern)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the captures this line defines.
    pub fn defined_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Capture { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Build a matcher for the whole pattern under `bindings`.
    pub fn instantiate(&self, bindings: &Bindings) -> Result<LineMatcher, UnboundCapture> {
        self.instantiate_prefix(self.segments.len(), bindings)
    }

    /// Build a matcher for the first `len` segments, used for nearest-miss scoring.
    pub fn instantiate_prefix(
        &self,
        len: usize,
        bindings: &Bindings,
    ) -> Result<LineMatcher, UnboundCapture> {
        let len = len.min(self.segments.len());
        let (source, captures, satisfiable) = self.regex_source(len, bindings, false)?;
        let regex = if satisfiable {
            match Regex::new(&source) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    log::warn!("pattern regex '{}' failed to build: {}", source, e);
                    None
                }
            }
        } else {
            None
        };
        Ok(LineMatcher { regex, captures })
    }

    /// Number of leading segments that match somewhere in `line`.
    pub fn prefix_score(&self, line: &str, bindings: &Bindings) -> usize {
        let mut score = 0;
        for len in 1..=self.segments.len() {
            match self.instantiate_prefix(len, bindings) {
                Ok(matcher) if matcher.find(line, 0).is_some() => score = len,
                _ => break,
            }
        }
        score
    }

    /// Regex source for the first `len` segments. `probe` replaces unbound
    /// back-references with an empty group instead of failing.
    fn regex_source(
        &self,
        len: usize,
        bindings: &Bindings,
        probe: bool,
    ) -> Result<(String, Vec<String>, bool), UnboundCapture> {
        let mut source = String::new();
        let mut captures = Vec::new();
        let mut satisfiable = true;

        for segment in &self.segments[..len] {
            match segment {
                Segment::Literal(text) => source.push_str(&regex::escape(text)),
                Segment::Separator => source.push_str(r"\s(?:.*?\s)?"),
                Segment::Regex(re) => {
                    let _ = write!(source, "(?:{})", re);
                }
                Segment::Capture { name, regex: re } => match bindings.get(name) {
                    Some(value) => {
                        satisfiable &= full_match(re, value);
                        source.push_str(&regex::escape(value));
                    }
                    None => {
                        let _ = write!(source, "(?P<c{}>{})", captures.len(), re);
                        captures.push(name.clone());
                    }
                },
                Segment::BackRef(name) => match bindings.get(name) {
                    Some(value) => source.push_str(&regex::escape(value)),
                    None if probe => source.push_str("(?:)"),
                    None => return Err(UnboundCapture(name.clone())),
                },
            }
        }

        Ok((source, captures, satisfiable))
    }
}

fn full_match(regex: &str, value: &str) -> bool {
    Regex::new(&format!("^(?:{})$", regex))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// A pattern instantiated against a fixed set of bindings.
#[derive(Debug, Clone)]
pub struct LineMatcher {
    /// `None` when the bindings make the pattern impossible to match.
    regex: Option<Regex>,
    /// Capture names, indexed by the `c<N>` group they were compiled to.
    captures: Vec<String>,
}

/// Where a pattern matched within a line and what it captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<(String, String)>,
}

impl LineMatcher {
    /// Search `line` starting at byte offset `from`.
    pub fn find(&self, line: &str, from: usize) -> Option<LineMatch> {
        let regex = self.regex.as_ref()?;
        if from > line.len() {
            return None;
        }
        let caps = regex.captures_at(line, from)?;
        let whole = caps.get(0)?;
        let captures = self
            .captures
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let text = caps
                    .name(&format!("c{}", index))
                    .map_or("", |m| m.as_str());
                (name.clone(), text.to_string())
            })
            .collect();
        Some(LineMatch {
            start: whole.start(),
            end: whole.end(),
            captures,
        })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(pairs: &[(&str, &str)]) -> Bindings {
        let mut bindings = Bindings::new();
        for (name, value) in pairs {
            bindings.bind(name, value).unwrap();
        }
        bindings
    }

    #[test]
    fn test_capture_binds_value() {
        let pattern = Pattern::parse("<<C:i\\d+>> IntConstant 1").unwrap();
        let matcher = pattern.instantiate(&Bindings::new()).unwrap();
        let m = matcher.find("  5 0 i3 IntConstant 1 env:[]", 0).unwrap();
        assert_eq!(m.captures, vec![("C".to_string(), "i3".to_string())]);
    }

    #[test]
    fn test_backref_substitutes_bound_value() {
        let pattern = Pattern::parse("Return [<<C>>]").unwrap();
        let matcher = pattern.instantiate(&bound(&[("C", "i3")])).unwrap();
        assert!(matcher.is_match("Return [i3]"));
        assert!(!matcher.is_match("Return [i4]"));
    }

    #[test]
    fn test_backref_escapes_value() {
        let pattern = Pattern::parse("ldr <<R>>").unwrap();
        let matcher = pattern.instantiate(&bound(&[("R", "[x0]")])).unwrap();
        assert!(matcher.is_match("ldr [x0]"));
        assert!(!matcher.is_match("ldr x"));
    }

    #[test]
    fn test_unbound_backref() {
        let pattern = Pattern::parse("Return [<<C>>]").unwrap();
        assert_eq!(
            pattern.instantiate(&Bindings::new()).unwrap_err(),
            UnboundCapture("C".to_string())
        );
    }

    #[test]
    fn test_separator_allows_words_between() {
        let pattern = Pattern::parse("InvokeVirtual intrinsic:StringEquals").unwrap();
        let matcher = pattern.instantiate(&Bindings::new()).unwrap();
        assert!(matcher.is_match(
            "z5 InvokeVirtual [l1,l2] method_name:java.lang.String.equals intrinsic:StringEquals"
        ));
        assert!(!matcher.is_match("InvokeVirtualintrinsic:StringEquals"));
        assert!(!matcher.is_match("intrinsic:StringEquals InvokeVirtual"));
    }

    #[test]
    fn test_regex_fragment() {
        let pattern = Pattern::parse("cmp {{r\\d+}}, {{r\\d+}}").unwrap();
        let matcher = pattern.instantiate(&Bindings::new()).unwrap();
        assert!(matcher.is_match("0x00000010: cmp r1, r2"));
        assert!(!matcher.is_match("cmp r1, #0"));
    }

    #[test]
    fn test_bound_capture_requires_equal_value() {
        let pattern = Pattern::parse("<<C:i\\d+>> IntConstant").unwrap();
        let matcher = pattern.instantiate(&bound(&[("C", "i3")])).unwrap();
        assert!(matcher.is_match("i3 IntConstant 1"));
        assert!(!matcher.is_match("i4 IntConstant 1"));
        let m = matcher.find("i3 IntConstant 1", 0).unwrap();
        assert!(m.captures.is_empty());
    }

    #[test]
    fn test_bound_capture_value_must_fit_regex() {
        let pattern = Pattern::parse("<<C:i\\d+>> IntConstant").unwrap();
        let matcher = pattern.instantiate(&bound(&[("C", "l3")])).unwrap();
        assert!(!matcher.is_match("l3 IntConstant 1"));
    }

    #[test]
    fn test_find_from_offset() {
        let pattern = Pattern::parse("add").unwrap();
        let matcher = pattern.instantiate(&Bindings::new()).unwrap();
        let m = matcher.find("add x0, add x1", 1).unwrap();
        assert_eq!((m.start, m.end), (8, 11));
        assert!(matcher.find("add", 10).is_none());
    }

    #[test]
    fn test_user_groups_do_not_shadow_captures() {
        let pattern = Pattern::parse("ldr{{(|.w)}} <<R:r\\d+>>").unwrap();
        let matcher = pattern.instantiate(&Bindings::new()).unwrap();
        let m = matcher.find("ldr.w r4, [r0]", 0).unwrap();
        assert_eq!(m.captures, vec![("R".to_string(), "r4".to_string())]);
    }

    #[test]
    fn test_duplicate_capture_rejected() {
        assert_eq!(
            Pattern::parse("<<X:a>> <<X:b>>"),
            Err(PatternError::DuplicateCapture("X".to_string()))
        );
    }

    #[test]
    fn test_same_line_reference_rejected() {
        assert_eq!(
            Pattern::parse("<<X:a>> <<X>>"),
            Err(PatternError::SameLineReference("X".to_string()))
        );
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert_eq!(Pattern::parse("   "), Err(PatternError::Empty));
    }

    #[test]
    fn test_prefix_score() {
        let pattern = Pattern::parse("<<C:i\\d+>> IntConstant 1").unwrap();
        let bindings = Bindings::new();
        assert_eq!(pattern.prefix_score("i3 IntConstant 1", &bindings), 5);
        assert_eq!(pattern.prefix_score("i3 IntConstant 2", &bindings), 4);
        assert_eq!(pattern.prefix_score("Return [i3]", &bindings), 1);
        assert_eq!(pattern.prefix_score("Goto", &bindings), 0);
    }

    #[test]
    fn test_defined_names() {
        let pattern = Pattern::parse("<<A:\\w+>> Add [<<B>>,<<C>>]").unwrap();
        assert_eq!(pattern.defined_names().collect::<Vec<_>>(), vec!["A"]);
    }
}
