//! Tokenizer for directive pattern text.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{alpha1, alphanumeric1, multispace1, satisfy},
    combinator::{all_consuming, not, recognize},
    multi::{many0_count, many1_count},
    sequence::{delimited, pair, preceded},
    IResult,
};

use super::{PatternError, Segment};

/// Body of a `{{regex}}` fragment.
fn regex_fragment(input: &str) -> IResult<&str, &str> {
    delimited(tag("{{"), take_until("}}"), tag("}}"))(input)
}

/// Body of a `<<Name>>` or `<<Name:regex>>` variable.
fn variable(input: &str) -> IResult<&str, &str> {
    delimited(tag("<<"), take_until(">>"), tag(">>"))(input)
}

/// A run of text that is neither whitespace nor the start of `{{` / `<<`.
fn literal(input: &str) -> IResult<&str, &str> {
    recognize(many1_count(preceded(
        not(alt((tag("{{"), tag("<<")))),
        satisfy(|c| !c.is_whitespace()),
    )))(input)
}

/// Capture names: `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn variable_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn validate_name(name: &str) -> Result<(), PatternError> {
    all_consuming(variable_name)(name)
        .map(|_| ())
        .map_err(|_: nom::Err<nom::error::Error<&str>>| {
            PatternError::InvalidName(name.to_string())
        })
}

fn validate_regex(regex: &str) -> Result<(), PatternError> {
    if regex.is_empty() {
        return Err(PatternError::EmptyRegex);
    }
    regex::Regex::new(regex)
        .map(|_| ())
        .map_err(|e| PatternError::InvalidRegex {
            regex: regex.to_string(),
            message: e.to_string(),
        })
}

/// Split pattern text into segments. Whitespace at either end is dropped.
pub(crate) fn parse_segments(text: &str) -> Result<Vec<Segment>, PatternError> {
    let mut input = text.trim();
    let mut segments = Vec::new();

    while !input.is_empty() {
        if input.starts_with("{{") {
            let (rest, body) =
                regex_fragment(input).map_err(|_| PatternError::Unterminated("{{"))?;
            validate_regex(body)?;
            segments.push(Segment::Regex(body.to_string()));
            input = rest;
        } else if input.starts_with("<<") {
            let (rest, body) = variable(input).map_err(|_| PatternError::Unterminated("<<"))?;
            match body.split_once(':') {
                Some((name, regex)) => {
                    validate_name(name)?;
                    validate_regex(regex)?;
                    segments.push(Segment::Capture {
                        name: name.to_string(),
                        regex: regex.to_string(),
                    });
                }
                None => {
                    validate_name(body)?;
                    segments.push(Segment::BackRef(body.to_string()));
                }
            }
            input = rest;
        } else if let Ok((rest, _)) = multispace1::<_, nom::error::Error<&str>>(input) {
            segments.push(Segment::Separator);
            input = rest;
        } else {
            let (rest, text) = literal(input).map_err(|_| PatternError::Empty)?;
            segments.push(Segment::Literal(text.to_string()));
            input = rest;
        }
    }

    Ok(segments)
}
