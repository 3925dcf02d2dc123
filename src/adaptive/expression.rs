//! Condition expressions
//!
//! A small boolean/value language evaluated against the adaptive memory
//! scope (`turn`, `dialog`, `options`, `foreach` plus the recognition
//! shortcuts `intent`, `score`, `text` and `entities`).
//!
//! ```text
//! intent == 'Cancel' && score >= 0.5
//! count(turn.activity.membersAdded) > 0
//! !exists(dialog.name) || lower(text) == 'restart'
//! ```

use std::cmp::Ordering;
use std::fmt;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, tuple},
};
use serde_json::Value;

use crate::errors::{DialogError, DialogResult};

/// One step of a memory path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Exists,
    Count,
    Contains,
    Lower,
}

impl Function {
    fn lookup(name: &str) -> Option<(Self, usize)> {
        match name {
            "exists" => Some((Self::Exists, 1)),
            "count" => Some((Self::Count, 1)),
            "contains" => Some((Self::Contains, 2)),
            "lower" => Some((Self::Lower, 1)),
            _ => None,
        }
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<PathSegment>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// A parsed expression together with its source text
#[derive(Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse `source`, failing with `InvalidExpression`
    pub fn parse(source: &str) -> DialogResult<Self> {
        match all_consuming(ws(or_expr))(source) {
            Ok((_, ast)) => Ok(Self {
                source: source.to_string(),
                ast,
            }),
            Err(e) => Err(DialogError::invalid_expression(source, e.to_string())),
        }
    }

    /// The constant `true`
    pub fn always() -> Self {
        Self {
            source: "true".to_string(),
            ast: Expr::Literal(Value::Bool(true)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate to a JSON value
    pub fn evaluate(&self, scope: &Value) -> DialogResult<Value> {
        eval(&self.ast, scope).map_err(|message| DialogError::invalid_expression(&self.source, message))
    }

    /// Evaluate and apply truthiness
    pub fn is_true(&self, scope: &Value) -> DialogResult<bool> {
        self.evaluate(scope).map(|v| truthy(&v))
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({:?})", self.source)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// `null`, `false`, `0`, `""` and empty collections are false
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// =============================================================================
// PARSER
// =============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("||")), and_expr))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |left, right| Expr::binary(BinaryOp::Or, left, right)),
    ))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = comparison(input)?;
    let (input, rest) = many0(preceded(ws(tag("&&")), comparison))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |left, right| Expr::binary(BinaryOp::And, left, right)),
    ))
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, left) = unary(input)?;
    let (input, tail) = opt(pair(ws(comparison_op), unary))(input)?;
    let expr = match tail {
        Some((op, right)) => Expr::binary(op, left, right),
        None => left,
    };
    Ok((input, expr))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('!')), unary), |inner| {
            Expr::Not(Box::new(inner))
        }),
        ws(primary),
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(char('('), ws(or_expr), char(')')),
        map(number, Expr::Literal),
        map(quoted_string, |s| Expr::Literal(Value::String(s.to_string()))),
        call,
        path_or_keyword,
    ))(input)
}

fn number(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        |text: &str| -> Result<Value, String> {
            if let Ok(integer) = text.parse::<i64>() {
                return Ok(Value::from(integer));
            }
            let float = text.parse::<f64>().map_err(|e| e.to_string())?;
            serde_json::Number::from_f64(float)
                .map(Value::Number)
                .ok_or_else(|| format!("'{text}' is not a finite number"))
        },
    )(input)
}

fn quoted_string(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_until("'"), char('\'')),
        delimited(char('"'), take_until("\""), char('"')),
    ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn index(input: &str) -> IResult<&str, usize> {
    map_res(delimited(char('['), digit1, char(']')), str::parse::<usize>)(input)
}

fn call(input: &str) -> IResult<&str, Expr> {
    map_res(
        pair(
            identifier,
            preceded(
                ws(char('(')),
                pair(separated_list0(ws(char(',')), or_expr), char(')')),
            ),
        ),
        |(name, (args, _))| -> Result<Expr, String> {
            let (function, arity) =
                Function::lookup(name).ok_or_else(|| format!("unknown function '{name}'"))?;
            if args.len() != arity {
                return Err(format!(
                    "{name} expects {arity} argument(s), got {}",
                    args.len()
                ));
            }
            Ok(Expr::Call { function, args })
        },
    )(input)
}

fn path_or_keyword(input: &str) -> IResult<&str, Expr> {
    let (input, head) = identifier(input)?;
    let (input, tail) = many0(alt((
        map(preceded(char('.'), identifier), |key: &str| {
            PathSegment::Key(key.to_string())
        }),
        map(index, PathSegment::Index),
    )))(input)?;

    if tail.is_empty() {
        match head {
            "true" => return Ok((input, Expr::Literal(Value::Bool(true)))),
            "false" => return Ok((input, Expr::Literal(Value::Bool(false)))),
            "null" => return Ok((input, Expr::Literal(Value::Null))),
            _ => {}
        }
    }
    let mut segments = Vec::with_capacity(tail.len() + 1);
    segments.push(PathSegment::Key(head.to_string()));
    segments.extend(tail);
    Ok((input, Expr::Path(segments)))
}

// =============================================================================
// EVALUATION
// =============================================================================

fn lookup<'v>(scope: &'v Value, segments: &[PathSegment]) -> Option<&'v Value> {
    segments.iter().try_fold(scope, |current, segment| match segment {
        PathSegment::Key(key) => current.as_object()?.get(key),
        PathSegment::Index(i) => current.as_array()?.get(*i),
    })
}

fn eval(expr: &Expr, scope: &Value) -> Result<Value, String> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(segments) => Ok(lookup(scope, segments).cloned().unwrap_or(Value::Null)),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, scope)?))),
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let left = truthy(&eval(left, scope)?);
                Ok(Value::Bool(left && truthy(&eval(right, scope)?)))
            }
            BinaryOp::Or => {
                let left = truthy(&eval(left, scope)?);
                Ok(Value::Bool(left || truthy(&eval(right, scope)?)))
            }
            BinaryOp::Eq => Ok(Value::Bool(loosely_equal(
                &eval(left, scope)?,
                &eval(right, scope)?,
            ))),
            BinaryOp::Ne => Ok(Value::Bool(!loosely_equal(
                &eval(left, scope)?,
                &eval(right, scope)?,
            ))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let left = eval(left, scope)?;
                let right = eval(right, scope)?;
                let ordering = compare(&left, &right)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
        },
        Expr::Call { function, args } => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_function(*function, &args)
        }
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, String> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b)
                .ok_or_else(|| format!("cannot order {a} and {b}"))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(format!("cannot order {left} and {right}")),
    }
}

fn call_function(function: Function, args: &[Value]) -> Result<Value, String> {
    match (function, args) {
        (Function::Exists, [v]) => Ok(Value::Bool(!v.is_null())),
        (Function::Count, [v]) => {
            let count = match v {
                Value::Null => 0,
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(s) => s.chars().count(),
                other => return Err(format!("count() of {other}")),
            };
            Ok(Value::from(count))
        }
        (Function::Contains, [haystack, needle]) => {
            let found = match (haystack, needle) {
                (Value::Null, _) => false,
                (Value::Array(items), _) => items.iter().any(|item| loosely_equal(item, needle)),
                (Value::String(s), Value::String(n)) => s.contains(n.as_str()),
                (Value::Object(map), Value::String(key)) => map.contains_key(key),
                _ => return Err(format!("contains({haystack}, {needle})")),
            };
            Ok(Value::Bool(found))
        }
        (Function::Lower, [Value::String(s)]) => Ok(Value::String(s.to_lowercase())),
        (Function::Lower, [Value::Null]) => Ok(Value::Null),
        (function, args) => Err(format!("{function:?} cannot take {args:?}")),
    }
}
