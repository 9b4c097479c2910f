//! Symbolic constraint expressions.
//!
//! A small arithmetic language over solution attributes, parsed with the
//! grammar in `expr.pest`. Operator precedence, loosest first:
//!
//! ```text
//! + -      left
//! * /      left
//! -x       prefix
//! ^        right
//! ```
//!
//! `-2^2` is `-(2^2)`. A relation chains one or more comparisons
//! (`<=`, `<`, `>=`, `>`, `==`, `=`); calls take a fixed number of arguments.
//!
//! Names are resolved to attribute indices when the relation is compiled,
//! so evaluation is a plain tree walk with no lookups.
//!
//! Strict and non-strict comparisons measure the same violation: on a
//! continuous domain the difference is below any useful tolerance.

use std::sync::LazyLock;

use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::solution::SearchSpace;

#[derive(Parser)]
#[grammar = "constraint/expr.pest"]
struct RelationParser;

static PRATT_PARSER: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left) | Op::infix(Rule::div, Assoc::Left))
        .op(Op::prefix(Rule::neg))
        .op(Op::infix(Rule::pow, Assoc::Right))
});

/// A parse or name-resolution failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct ExpressionError {
    /// Byte offset into the source.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

impl ExpressionError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl From<pest::error::Error<Rule>> for ExpressionError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let position = match err.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        Self::new(position, err.variant.message())
    }
}

/// Comparison operator linking two expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
}

impl Comparison {
    /// How far `lhs op rhs` is from holding. 0 when it holds.
    pub fn violation(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Comparison::Less | Comparison::LessEqual => (lhs - rhs).max(0.0),
            Comparison::Greater | Comparison::GreaterEqual => (rhs - lhs).max(0.0),
            Comparison::Equal => (lhs - rhs).abs(),
        }
    }

    /// Whether this is an ordering (inequality) comparison.
    pub fn is_inequality(self) -> bool {
        !matches!(self, Comparison::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    Min,
    Max,
    Pow,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Function::Abs,
            "sqrt" => Function::Sqrt,
            "exp" => Function::Exp,
            "ln" | "log" => Function::Ln,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "min" => Function::Min,
            "max" => Function::Max,
            "pow" => Function::Pow,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Function::Min | Function::Max | Function::Pow => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Function::Abs => args[0].abs(),
            Function::Sqrt => args[0].sqrt(),
            Function::Exp => args[0].exp(),
            Function::Ln => args[0].ln(),
            Function::Sin => args[0].sin(),
            Function::Cos => args[0].cos(),
            Function::Min => args[0].min(args[1]),
            Function::Max => args[0].max(args[1]),
            Function::Pow => args[0].powf(args[1]),
        }
    }
}

/// Compiled arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Attribute index.
    Variable(usize),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Evaluates against an attribute vector.
    pub fn eval(&self, attributes: &[f64]) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Variable(i) => attributes.get(*i).copied().unwrap_or(f64::NAN),
            Expr::Neg(e) => -e.eval(attributes),
            Expr::Binary(op, a, b) => {
                let (a, b) = (a.eval(attributes), b.eval(attributes));
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Expr::Call(f, args) => {
                let values: Vec<f64> = args.iter().map(|e| e.eval(attributes)).collect();
                f.apply(&values)
            }
        }
    }
}

/// A chain of comparisons, e.g. `x + y <= 5` or `0 <= x <= 5`.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    terms: Vec<Expr>,
    comparisons: Vec<Comparison>,
}

impl Relation {
    /// Parses `source` and resolves variable names against `space`.
    pub fn parse(source: &str, space: &SearchSpace) -> Result<Self, ExpressionError> {
        let relation = RelationParser::parse(Rule::relation, source)?
            .next()
            .ok_or_else(|| ExpressionError::new(0, "empty relation"))?;

        let mut terms = Vec::new();
        let mut comparisons = Vec::new();
        for pair in relation.into_inner() {
            match pair.as_rule() {
                Rule::expr => terms.push(build_expr(pair, space)?),
                Rule::cmp => comparisons.push(parse_comparison(pair.as_str())),
                _ => {}
            }
        }
        Ok(Relation { terms, comparisons })
    }

    /// The comparison operators, left to right.
    pub fn comparisons(&self) -> &[Comparison] {
        &self.comparisons
    }

    /// Total violation over every link of the chain.
    ///
    /// Non-finite intermediate values count as an infinite violation.
    pub fn violation(&self, attributes: &[f64]) -> f64 {
        let values: Vec<f64> = self.terms.iter().map(|t| t.eval(attributes)).collect();
        let mut total = 0.0;
        for (i, cmp) in self.comparisons.iter().enumerate() {
            let (lhs, rhs) = (values[i], values[i + 1]);
            if !lhs.is_finite() || !rhs.is_finite() {
                return f64::INFINITY;
            }
            total += cmp.violation(lhs, rhs);
        }
        total
    }
}

fn parse_comparison(op: &str) -> Comparison {
    match op {
        "<=" => Comparison::LessEqual,
        "<" => Comparison::Less,
        ">=" => Comparison::GreaterEqual,
        ">" => Comparison::Greater,
        _ => Comparison::Equal,
    }
}

fn build_expr(pair: Pair<'_, Rule>, space: &SearchSpace) -> Result<Expr, ExpressionError> {
    PRATT_PARSER
        .map_primary(|primary| build_primary(primary, space))
        .map_prefix(|_neg, operand| Ok(Expr::Neg(Box::new(operand?))))
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                Rule::pow => BinaryOp::Pow,
                rule => {
                    return Err(ExpressionError::new(
                        op.as_span().start(),
                        format!("unexpected operator {rule:?}"),
                    ))
                }
            };
            Ok(Expr::Binary(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pair.into_inner())
}

fn build_primary(pair: Pair<'_, Rule>, space: &SearchSpace) -> Result<Expr, ExpressionError> {
    let position = pair.as_span().start();
    match pair.as_rule() {
        Rule::number => {
            let text = pair.as_str();
            text.parse::<f64>()
                .map(Expr::Number)
                .map_err(|_| ExpressionError::new(position, format!("invalid number '{text}'")))
        }
        Rule::ident => {
            let name = pair.as_str();
            space.index_of(name).map(Expr::Variable).ok_or_else(|| {
                ExpressionError::new(position, format!("unknown variable '{name}'"))
            })
        }
        Rule::call => build_call(pair, space),
        Rule::expr => build_expr(pair, space),
        rule => Err(ExpressionError::new(
            position,
            format!("unexpected {rule:?}"),
        )),
    }
}

fn build_call(pair: Pair<'_, Rule>, space: &SearchSpace) -> Result<Expr, ExpressionError> {
    let position = pair.as_span().start();
    let mut inner = pair.into_inner();
    let name = inner.next().map(|p| p.as_str()).unwrap_or_default();
    let func = Function::lookup(name)
        .ok_or_else(|| ExpressionError::new(position, format!("unknown function '{name}'")))?;

    let args = inner
        .map(|arg| build_expr(arg, space))
        .collect::<Result<Vec<_>, _>>()?;
    if args.len() != func.arity() {
        return Err(ExpressionError::new(
            position,
            format!(
                "function '{name}' takes {} argument(s), got {}",
                func.arity(),
                args.len()
            ),
        ));
    }
    Ok(Expr::Call(func, args))
}
