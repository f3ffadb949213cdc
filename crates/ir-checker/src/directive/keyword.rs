//! `CHECK[-<SUFFIX>]:` keyword grammar.

use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{char, one_of, space0},
    combinator::peek,
    sequence::terminated,
    IResult,
};

use super::CheckKind;
use crate::{arch::Arch, error::DirectiveError};

/// Directive keyword with its arguments stripped off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Start(Option<Arch>),
    Line(CheckKind),
}

/// `CHECK` followed by `-` or `:`. Anything else (e.g. `CHECKS`) is prose.
fn check_prefix(input: &str) -> IResult<&str, &str> {
    terminated(tag("CHECK"), peek(one_of("-:")))(input)
}

/// Suffix between `CHECK` and the colon, e.g. `-START-ARM64`.
fn suffix(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == ':' || c.is_whitespace())(input)
}

fn colon(input: &str) -> IResult<&str, char> {
    terminated(char(':'), space0)(input)
}

fn keyword_for(suffix: &str) -> Result<Keyword, DirectiveError> {
    Ok(match suffix {
        "" => Keyword::Line(CheckKind::Match),
        "-NEXT" => Keyword::Line(CheckKind::Next),
        "-SAME" => Keyword::Line(CheckKind::Same),
        "-NOT" => Keyword::Line(CheckKind::Not),
        "-DAG" => Keyword::Line(CheckKind::Dag),
        "-EVAL" => Keyword::Line(CheckKind::Eval),
        "-START" => Keyword::Start(None),
        other => match other.strip_prefix("-START-") {
            Some(arch) => Keyword::Start(Some(
                Arch::ALL
                    .into_iter()
                    .find(|a| a.directive_name() == arch)
                    .ok_or_else(|| crate::arch::UnknownArch(arch.to_string()))?,
            )),
            None => return Err(DirectiveError::UnknownKeyword(other.to_string())),
        },
    })
}

/// Parse comment text. `Ok(None)` means the text is not a directive at all.
pub(crate) fn parse_keyword(text: &str) -> Result<Option<(Keyword, &str)>, DirectiveError> {
    let Ok((rest, _)) = check_prefix(text) else {
        return Ok(None);
    };
    let (rest, suffix) = suffix(rest).map_err(|_| DirectiveError::MissingColon)?;
    let keyword = keyword_for(suffix)?;
    match colon(rest) {
        Ok((body, _)) => Ok(Some((keyword, body.trim()))),
        Err(_) => Err(DirectiveError::MissingColon),
    }
}
