//! `CHECK-EVAL` expression parser.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_res, not, opt, peek, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use super::{BinaryOp, Expr, ExprError, UnaryOp};
use crate::pattern::variable_name;

/// Wrap a parser so it skips surrounding whitespace.
fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn integer(input: &str) -> IResult<&str, i64> {
    alt((
        map_res(
            preceded(
                alt((tag("0x"), tag("0X"))),
                take_while1(|c: char| c.is_ascii_hexdigit()),
            ),
            |digits: &str| i64::from_str_radix(digits, 16),
        ),
        map_res(take_while1(|c: char| c.is_ascii_digit()), |digits: &str| {
            digits.parse::<i64>()
        }),
    ))(input)
}

fn string(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('"'), take_till(|c: char| c == '"'), char('"')),
            delimited(char('\''), take_till(|c: char| c == '\''), char('\'')),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// A keyword that is not the prefix of a longer identifier.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(
        tag(word),
        not(peek(take_while1(|c: char| c.is_alphanumeric() || c == '_'))),
    )
}

fn capture_ref(input: &str) -> IResult<&str, Expr> {
    map(delimited(tag("<<"), variable_name, tag(">>")), |name: &str| {
        Expr::Capture(name.to_string())
    })(input)
}

fn call(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(
            keyword("hasIsaFeature"),
            delimited(ws(char('(')), string, ws(char(')'))),
        ),
        Expr::HasIsaFeature,
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(integer, Expr::Int),
        map(string, Expr::Str),
        value(Expr::Bool(true), keyword("true")),
        value(Expr::Bool(false), keyword("false")),
        capture_ref,
        call,
        delimited(char('('), expr, char(')')),
    )))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('!')), unary), |e| {
            Expr::Unary(UnaryOp::Not, Box::new(e))
        }),
        map(preceded(ws(char('-')), unary), |e| {
            Expr::Unary(UnaryOp::Neg, Box::new(e))
        }),
        primary,
    ))(input)
}

/// Left-associative chain of `operand (op operand)*`.
fn chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
    op: fn(&'a str) -> IResult<&'a str, BinaryOp>,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input)?;
    let (input, rest) = many0(pair(ws(op), operand))(input)?;
    let folded = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    });
    Ok((input, folded))
}

fn product_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Mul, char('*')),
        value(BinaryOp::Div, char('/')),
        value(BinaryOp::Rem, char('%')),
    ))(input)
}

fn sum_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-'))))(input)
}

fn cmp_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::Gt, char('>')),
    ))(input)
}

fn product(input: &str) -> IResult<&str, Expr> {
    chain(input, unary, product_op)
}

fn sum(input: &str) -> IResult<&str, Expr> {
    chain(input, product, sum_op)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = sum(input)?;
    let (input, rhs) = opt(pair(ws(cmp_op), sum))(input)?;
    Ok(match rhs {
        Some((op, rhs)) => (input, Expr::Binary(op, Box::new(lhs), Box::new(rhs))),
        None => (input, lhs),
    })
}

fn conjunction(input: &str) -> IResult<&str, Expr> {
    chain(input, comparison, |i| value(BinaryOp::And, tag("&&"))(i))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    chain(input, conjunction, |i| value(BinaryOp::Or, tag("||"))(i))
}

pub(crate) fn parse_expr(text: &str) -> Result<Expr, ExprError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExprError::Empty);
    }
    match all_consuming(ws(expr))(trimmed) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExprError::Syntax {
            position: trimmed.len() - e.input.len(),
            text: trimmed.to_string(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Syntax {
            position: trimmed.len(),
            text: trimmed.to_string(),
        }),
    }
}
