//! `CHECK-EVAL` expressions over bound captures.

mod parser;

use core::fmt;

use crate::{bindings::Bindings, output::IsaFeatures};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Parsed `CHECK-EVAL` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Int(i64),
    Str(String),
    Bool(bool),
    /// `<<Name>>`
    Capture(String),
    /// `hasIsaFeature("name")`
    HasIsaFeature(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Runtime value of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// Captured text is numeric when it reads as a decimal or `0x` integer.
    pub fn from_capture(text: &str) -> Value {
        let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => text.parse::<i64>().ok(),
        };
        match parsed {
            Some(n) => Value::Int(n),
            None => Value::Str(text.to_string()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Expression text that does not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,
    #[error("syntax error at column {position} in '{text}'")]
    Syntax { position: usize, text: String },
}

/// Expression that parses but cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("capture '{0}' is referenced before it is bound")]
    Unbound(String),
    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("cannot apply '{op}' to {operand}")]
    BadOperand { op: &'static str, operand: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("expression evaluated to {0}, expected a boolean")]
    NotBoolean(String),
}

/// What an expression can see while it is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct EvalEnv<'a> {
    pub bindings: &'a Bindings,
    pub isa_features: &'a IsaFeatures,
}

impl Expr {
    pub fn parse(text: &str) -> Result<Expr, ExprError> {
        parser::parse_expr(text)
    }

    /// Evaluate and require a boolean result.
    pub fn evaluate_bool(&self, env: EvalEnv<'_>) -> Result<bool, EvalError> {
        match self.evaluate(env)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBoolean(other.to_string())),
        }
    }

    pub fn evaluate(&self, env: EvalEnv<'_>) -> Result<Value, EvalError> {
        match self {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Capture(name) => env
                .bindings
                .get(name)
                .map(Value::from_capture)
                .ok_or_else(|| EvalError::Unbound(name.clone())),
            Expr::HasIsaFeature(feature) => Ok(Value::Bool(env.isa_features.has(feature))),
            Expr::Unary(op, operand) => {
                let value = operand.evaluate(env)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(n)) => {
                        n.checked_neg().map(Value::Int).ok_or(EvalError::Overflow)
                    }
                    (UnaryOp::Not, other) => Err(EvalError::BadOperand {
                        op: "!",
                        operand: other.type_name(),
                    }),
                    (UnaryOp::Neg, other) => Err(EvalError::BadOperand {
                        op: "-",
                        operand: other.type_name(),
                    }),
                }
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(Value::Bool(lhs.evaluate_bool(env)? && rhs.evaluate_bool(env)?))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(Value::Bool(lhs.evaluate_bool(env)? || rhs.evaluate_bool(env)?))
            }
            Expr::Binary(op, lhs, rhs) => binary(*op, lhs.evaluate(env)?, rhs.evaluate(env)?),
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    use core::cmp::Ordering;

    let ordering = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
            Some(a.cmp(b))
        }
        _ => None,
    };
    let mismatch = || EvalError::TypeMismatch {
        op: op.symbol(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(ordering == Some(Ordering::Equal))),
        BinaryOp::Ne => Ok(Value::Bool(ordering != Some(Ordering::Equal))),
        BinaryOp::Lt => ordering.map(|o| Value::Bool(o == Ordering::Less)).ok_or_else(mismatch),
        BinaryOp::Le => ordering
            .map(|o| Value::Bool(o != Ordering::Greater))
            .ok_or_else(mismatch),
        BinaryOp::Gt => ordering
            .map(|o| Value::Bool(o == Ordering::Greater))
            .ok_or_else(mismatch),
        BinaryOp::Ge => ordering.map(|o| Value::Bool(o != Ordering::Less)).ok_or_else(mismatch),
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or(EvalError::Overflow),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            _ => Err(mismatch()),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) else {
                return Err(mismatch());
            };
            let result = match op {
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div | BinaryOp::Rem if *b == 0 => {
                    return Err(EvalError::DivisionByZero)
                }
                BinaryOp::Div => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        BinaryOp::And | BinaryOp::Or => Err(mismatch()),
    }
}
