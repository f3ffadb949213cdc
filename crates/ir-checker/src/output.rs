//! Segmenting compiler dumps into per-pass output blocks.
//!
//! The compiler writes a c1visualizer-style dump:
//!
//! ```text
//! begin_compilation
//!   name "boolean Main.stringEqualsSame()"
//!   method "boolean Main.stringEqualsSame()"
//!   date 1437589431
//! end_compilation
//! begin_cfg
//!   name "register (before)"
//!   ...
//! end_cfg
//! ```
//!
//! Every cfg section becomes one [`OutputBlock`], keyed by the method of the
//! enclosing compilation and the cfg name. Compilations named `isa:<arch>`
//! and `isa_features:<list>` describe the target the dump was produced for.

use std::collections::{BTreeSet, HashMap};

use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{char, space0, space1},
    combinator::all_consuming,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::{
    arch::Arch,
    header::{parse_group_name, GroupName},
};

/// One cfg section of the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBlock {
    pub name: GroupName,
    /// Architecture the dump declared, if any.
    pub arch: Option<Arch>,
    /// Body lines, verbatim.
    pub lines: Vec<String>,
    /// 1-based dump line number of `lines[0]`.
    pub first_line: usize,
}

impl OutputBlock {
    /// Block built directly from lines, for callers that already split their output.
    pub fn new(name: GroupName, lines: Vec<String>) -> Self {
        Self {
            name,
            arch: None,
            lines,
            first_line: 1,
        }
    }

    /// Dump line number of body line `index`.
    pub fn dump_line(&self, index: usize) -> usize {
        self.first_line + index
    }
}

/// ISA features declared by an `isa_features:` compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsaFeatures {
    enabled: BTreeSet<String>,
}

impl IsaFeatures {
    /// Parse `a53,crc,-lse`: names prefixed with `-` are disabled.
    pub fn parse(list: &str) -> Self {
        let enabled = list
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty() && !f.starts_with('-'))
            .map(str::to_string)
            .collect();
        Self { enabled }
    }

    pub fn has(&self, feature: &str) -> bool {
        self.enabled.contains(feature)
    }
}

/// A parsed dump.
#[derive(Debug, Clone, Default)]
pub struct Dump {
    blocks: Vec<OutputBlock>,
    index: HashMap<GroupName, usize>,
    pub arch: Option<Arch>,
    pub isa_features: IsaFeatures,
}

impl Dump {
    /// Build a dump from blocks directly. Later blocks with a key already
    /// present are kept but never looked up.
    pub fn from_blocks(blocks: Vec<OutputBlock>) -> Self {
        let mut dump = Dump::default();
        for block in blocks {
            dump.push(block);
        }
        dump
    }

    fn push(&mut self, block: OutputBlock) {
        if self.index.contains_key(&block.name) {
            log::warn!("duplicate dump block '{}', keeping the first one", block.name);
        } else {
            self.index.insert(block.name.clone(), self.blocks.len());
        }
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[OutputBlock] {
        &self.blocks
    }

    pub fn find(&self, name: &GroupName) -> Option<&OutputBlock> {
        self.index.get(name).map(|&i| &self.blocks[i])
    }
}

/// Structural error in the dump text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct OutputError {
    pub line: usize,
    pub message: String,
}

fn output_error(line: usize, message: impl Into<String>) -> OutputError {
    OutputError {
        line,
        message: message.into(),
    }
}

/// `name "<value>"`, `method "<value>"`.
fn quoted_property<'a>(key: &'static str, input: &'a str) -> IResult<&'a str, &'a str> {
    all_consuming(delimited(
        space0,
        preceded(
            tuple((tag(key), space1)),
            delimited(char('"'), take_till(|c: char| c == '"'), char('"')),
        ),
        space0,
    ))(input)
}

enum State {
    Top,
    Compilation {
        start: usize,
        name: Option<String>,
        method: Option<String>,
    },
    Cfg {
        start: usize,
        name: Option<(String, usize)>,
        lines: Vec<String>,
    },
}

/// Split dump text into output blocks.
pub fn parse_dump(text: &str) -> Result<Dump, OutputError> {
    let mut dump = Dump::default();
    let mut method: Option<String> = None;
    let mut state = State::Top;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();

        state = match state {
            State::Top => match trimmed {
                "" => State::Top,
                "begin_compilation" => State::Compilation {
                    start: line_no,
                    name: None,
                    method: None,
                },
                "begin_cfg" => {
                    if method.is_none() {
                        return Err(output_error(line_no, "begin_cfg outside of a compilation"));
                    }
                    State::Cfg {
                        start: line_no,
                        name: None,
                        lines: Vec::new(),
                    }
                }
                other => {
                    return Err(output_error(
                        line_no,
                        format!("unexpected '{}' between sections", other),
                    ))
                }
            },
            State::Compilation {
                start,
                name,
                method: method_prop,
            } => match trimmed {
                "end_compilation" => {
                    let name = name.ok_or_else(|| {
                        output_error(start, "compilation without a name")
                    })?;
                    if let Some(isa) = name.strip_prefix("isa:") {
                        dump.arch = Arch::from_isa_name(isa.trim());
                        if dump.arch.is_none() {
                            log::warn!("dump declares unknown isa '{}'", isa);
                        }
                    } else if let Some(features) = name.strip_prefix("isa_features:") {
                        dump.isa_features = IsaFeatures::parse(features);
                    } else {
                        method = Some(method_prop.unwrap_or(name));
                    }
                    State::Top
                }
                "begin_compilation" | "begin_cfg" => {
                    return Err(output_error(line_no, "unterminated compilation section"))
                }
                _ => {
                    let mut name = name;
                    let mut method_prop = method_prop;
                    if let Ok((_, value)) = quoted_property("name", line) {
                        name = Some(value.to_string());
                    } else if let Ok((_, value)) = quoted_property("method", line) {
                        method_prop = Some(value.to_string());
                    } else if trimmed.starts_with("name") || trimmed.starts_with("method") {
                        return Err(output_error(line_no, "expected a quoted string"));
                    }
                    State::Compilation {
                        start,
                        name,
                        method: method_prop,
                    }
                }
            },
            State::Cfg {
                start,
                name,
                mut lines,
            } => match (trimmed, name) {
                ("end_cfg", None) => return Err(output_error(start, "cfg without a name")),
                ("end_cfg", Some((cfg_name, first_line))) => {
                    let method = method.as_deref().unwrap_or_default();
                    let full = format!("{} {}", method, cfg_name);
                    match parse_group_name(&full) {
                        Ok(group) => dump.push(OutputBlock {
                            name: group,
                            arch: None,
                            lines,
                            first_line,
                        }),
                        Err(e) => log::debug!("skipping dump block '{}': {}", full, e),
                    }
                    State::Top
                }
                ("begin_cfg", _) | ("begin_compilation", _) => {
                    return Err(output_error(line_no, "unterminated cfg section"))
                }
                (_, None) => match quoted_property("name", line) {
                    Ok((_, value)) => State::Cfg {
                        start,
                        name: Some((value.to_string(), line_no + 1)),
                        lines,
                    },
                    Err(_) => return Err(output_error(line_no, "cfg must start with a name")),
                },
                (_, name) => {
                    lines.push(line.to_string());
                    State::Cfg { start, name, lines }
                }
            },
        };
    }

    match state {
        State::Top => {}
        State::Compilation { start, .. } => {
            return Err(output_error(start, "unterminated compilation section"))
        }
        State::Cfg { start, .. } => return Err(output_error(start, "unterminated cfg section")),
    }

    if let Some(arch) = dump.arch {
        for block in &mut dump.blocks {
            block.arch = Some(arch);
        }
    }
    Ok(dump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Phase;

    const DUMP: &str = r#"begin_compilation
  name "isa:arm64"
  method "isa:arm64"
  date 0
end_compilation
begin_compilation
  name "isa_features:a53,crc,-lse"
  method "isa_features:a53,crc,-lse"
  date 0
end_compilation
begin_compilation
  name "boolean Main.stringEqualsSame()"
  method "boolean Main.stringEqualsSame()"
  date 1437589431
end_compilation
begin_cfg
  name "builder"
  0 0 l1 ParameterValue
end_cfg
begin_cfg
  name "register (before)"
    0 0 i3 IntConstant 1
    1 0 Return [i3]
end_cfg
"#;

    #[test]
    fn test_parse_dump_blocks() {
        let dump = parse_dump(DUMP).unwrap();
        assert_eq!(dump.blocks().len(), 1);
        let block = &dump.blocks()[0];
        assert_eq!(block.name.method, "boolean Main.stringEqualsSame()");
        assert_eq!(block.name.pass, "register");
        assert_eq!(block.name.phase, Phase::Before);
        assert_eq!(block.lines, vec!["    0 0 i3 IntConstant 1", "    1 0 Return [i3]"]);
        assert_eq!(block.first_line, 22);
        assert_eq!(block.dump_line(1), 23);
    }

    #[test]
    fn test_parse_dump_isa() {
        let dump = parse_dump(DUMP).unwrap();
        assert_eq!(dump.arch, Some(Arch::Arm64));
        assert_eq!(dump.blocks()[0].arch, Some(Arch::Arm64));
        assert!(dump.isa_features.has("crc"));
        assert!(!dump.isa_features.has("lse"));
    }

    #[test]
    fn test_find_block() {
        let dump = parse_dump(DUMP).unwrap();
        let name = parse_group_name("boolean Main.stringEqualsSame() register (before)").unwrap();
        assert!(dump.find(&name).is_some());
        let missing = parse_group_name("boolean Main.stringEqualsSame() register (after)").unwrap();
        assert!(dump.find(&missing).is_none());
    }

    #[test]
    fn test_duplicate_blocks_keep_first() {
        let name = parse_group_name("int Main.f() gvn (after)").unwrap();
        let dump = Dump::from_blocks(vec![
            OutputBlock::new(name.clone(), vec!["first".to_string()]),
            OutputBlock::new(name.clone(), vec!["second".to_string()]),
        ]);
        assert_eq!(dump.find(&name).unwrap().lines, vec!["first"]);
        assert_eq!(dump.blocks().len(), 2);
    }

    #[test]
    fn test_cfg_outside_compilation() {
        let err = parse_dump("begin_cfg\n  name \"gvn (after)\"\nend_cfg\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_unterminated_cfg() {
        let text = "begin_compilation\n  name \"int Main.f()\"\nend_compilation\nbegin_cfg\n  name \"gvn (after)\"\n  x\n";
        let err = parse_dump(text).unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_cfg_without_name() {
        let text = "begin_compilation\n  name \"int Main.f()\"\nend_compilation\nbegin_cfg\n  i1 IntConstant 1\nend_cfg\n";
        assert!(parse_dump(text).is_err());
    }

    #[test]
    fn test_unquoted_name() {
        let text = "begin_compilation\n  name int Main.f()\nend_compilation\n";
        let err = parse_dump(text).unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_method_property_wins() {
        let text = "begin_compilation\n  name \"f\"\n  method \"int Main.f()\"\nend_compilation\nbegin_cfg\n  name \"gvn (after)\"\nend_cfg\n";
        let dump = parse_dump(text).unwrap();
        assert_eq!(dump.blocks()[0].name.method, "int Main.f()");
        assert!(dump.blocks()[0].lines.is_empty());
    }
}
