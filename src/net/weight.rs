//! 弧权重表达式：常量或依赖当前标识的函数式权重。
//!
//! 语法（忽略空白）：
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := integer | count | ('min' | 'max') '(' expr ',' expr ')' | '(' expr ')'
//! count  := '#' '(' token ')' | '#' '(' place ',' token ')'
//! ```
//!
//! `#(k)` 读取弧自身所连库所中种类 `k` 的令牌数，`#(p, k)` 读取库所 `p`。
//! 求值只读、幂等；结果为负、引用不存在的种类或库所、除零与溢出均报错。
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1, multispace0, one_of};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, separated_pair};
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::core::NetError;
use crate::net::ids::{PlaceId, TokenId};
use crate::net::marking::{Marking, TokenCounts};
use crate::net::structure::{Arc, TokenKind, Weight};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul | BinOp::Div => 2,
            BinOp::Min | BinOp::Max => 3,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Min => "min",
            BinOp::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum WeightExpr {
    Literal(Weight),
    Count {
        place: Option<PlaceId>,
        token: TokenId,
    },
    Binary {
        op: BinOp,
        lhs: Box<WeightExpr>,
        rhs: Box<WeightExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed weight expression {input:?}: {detail}")]
pub struct ParseWeightError {
    pub input: String,
    pub detail: String,
}

/// Why a weight expression could not be turned into a token count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeightError {
    #[error("unknown token kind '{0}'")]
    UnknownToken(TokenId),
    #[error("unknown place '{0}'")]
    UnknownPlace(PlaceId),
    #[error("evaluates to negative value {0}")]
    Negative(i64),
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

/// What `#(..)` references resolve against.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Place the arc is attached to; the default for `#(token)`.
    pub place: &'a PlaceId,
    pub marking: &'a Marking,
    pub tokens: &'a IndexMap<TokenId, TokenKind>,
}

impl WeightExpr {
    pub fn count(token: impl Into<TokenId>) -> Self {
        WeightExpr::Count {
            place: None,
            token: token.into(),
        }
    }

    pub fn count_at(place: impl Into<PlaceId>, token: impl Into<TokenId>) -> Self {
        WeightExpr::Count {
            place: Some(place.into()),
            token: token.into(),
        }
    }

    pub fn binary(op: BinOp, lhs: WeightExpr, rhs: WeightExpr) -> Self {
        WeightExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// True when the value does not depend on any marking.
    pub fn is_constant(&self) -> bool {
        match self {
            WeightExpr::Literal(_) => true,
            WeightExpr::Count { .. } => false,
            WeightExpr::Binary { lhs, rhs, .. } => lhs.is_constant() && rhs.is_constant(),
        }
    }

    pub fn references_token(&self, token: &str) -> bool {
        match self {
            WeightExpr::Literal(_) => false,
            WeightExpr::Count { token: t, .. } => t == token,
            WeightExpr::Binary { lhs, rhs, .. } => {
                lhs.references_token(token) || rhs.references_token(token)
            }
        }
    }

    pub fn references_place(&self, place: &str) -> bool {
        match self {
            WeightExpr::Literal(_) => false,
            WeightExpr::Count { place: p, .. } => p.as_ref().is_some_and(|p| p == place),
            WeightExpr::Binary { lhs, rhs, .. } => {
                lhs.references_place(place) || rhs.references_place(place)
            }
        }
    }

    pub(crate) fn rename_token(&mut self, old: &str, new: &TokenId) {
        match self {
            WeightExpr::Literal(_) => {}
            WeightExpr::Count { token, .. } => {
                if token == old {
                    *token = new.clone();
                }
            }
            WeightExpr::Binary { lhs, rhs, .. } => {
                lhs.rename_token(old, new);
                rhs.rename_token(old, new);
            }
        }
    }

    pub(crate) fn rename_place(&mut self, old: &str, new: &PlaceId) {
        match self {
            WeightExpr::Literal(_) => {}
            WeightExpr::Count { place, .. } => {
                if let Some(place) = place.as_mut().filter(|p| *p == old) {
                    *place = new.clone();
                }
            }
            WeightExpr::Binary { lhs, rhs, .. } => {
                lhs.rename_place(old, new);
                rhs.rename_place(old, new);
            }
        }
    }

    /// Evaluates against `ctx` without touching it.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Weight, WeightError> {
        let value = self.eval(ctx)?;
        Weight::try_from(value).map_err(|_| WeightError::Negative(value))
    }

    // 中间结果允许为负，只有最终结果必须非负
    fn eval(&self, ctx: &EvalContext<'_>) -> Result<i64, WeightError> {
        match self {
            WeightExpr::Literal(value) => i64::try_from(*value).map_err(|_| WeightError::Overflow),
            WeightExpr::Count { place, token } => {
                if !ctx.tokens.contains_key(token.as_str()) {
                    return Err(WeightError::UnknownToken(token.clone()));
                }
                let place = place.as_ref().unwrap_or(ctx.place);
                let counts = ctx
                    .marking
                    .counts(place)
                    .ok_or_else(|| WeightError::UnknownPlace(place.clone()))?;
                let count = counts.get(token.as_str()).copied().unwrap_or(0);
                i64::try_from(count).map_err(|_| WeightError::Overflow)
            }
            WeightExpr::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(ctx)?;
                let rhs = rhs.eval(ctx)?;
                match op {
                    BinOp::Add => lhs.checked_add(rhs).ok_or(WeightError::Overflow),
                    BinOp::Sub => lhs.checked_sub(rhs).ok_or(WeightError::Overflow),
                    BinOp::Mul => lhs.checked_mul(rhs).ok_or(WeightError::Overflow),
                    BinOp::Div if rhs == 0 => Err(WeightError::DivisionByZero),
                    BinOp::Div => lhs.checked_div(rhs).ok_or(WeightError::Overflow),
                    BinOp::Min => Ok(lhs.min(rhs)),
                    BinOp::Max => Ok(lhs.max(rhs)),
                }
            }
        }
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, parent: u8, strict: bool) -> fmt::Result {
        match self {
            WeightExpr::Literal(value) => write!(f, "{value}"),
            WeightExpr::Count { place: None, token } => write!(f, "#({token})"),
            WeightExpr::Count {
                place: Some(place),
                token,
            } => write!(f, "#({place}, {token})"),
            WeightExpr::Binary { op, lhs, rhs } if matches!(op, BinOp::Min | BinOp::Max) => {
                write!(f, "{}(", op.symbol())?;
                lhs.fmt_with(f, 0, false)?;
                f.write_str(", ")?;
                rhs.fmt_with(f, 0, false)?;
                f.write_str(")")
            }
            WeightExpr::Binary { op, lhs, rhs } => {
                let own = op.precedence();
                let wrap = own < parent || (strict && own == parent);
                if wrap {
                    f.write_str("(")?;
                }
                lhs.fmt_with(f, own, false)?;
                write!(f, " {} ", op.symbol())?;
                // 减法与除法不满足结合律，右操作数同级时需要括号
                rhs.fmt_with(f, own, matches!(op, BinOp::Sub | BinOp::Div))?;
                if wrap {
                    f.write_str(")")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for WeightExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 0, false)
    }
}

impl From<Weight> for WeightExpr {
    fn from(value: Weight) -> Self {
        WeightExpr::Literal(value)
    }
}

impl From<WeightExpr> for String {
    fn from(value: WeightExpr) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for WeightExpr {
    type Error = ParseWeightError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for WeightExpr {
    type Err = ParseWeightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(expr)
            .parse(s)
            .map(|(_, parsed)| parsed)
            .map_err(|err| ParseWeightError {
                input: s.to_owned(),
                detail: err.to_string(),
            })
    }
}

type ParseError<'a> = nom::error::Error<&'a str>;

fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = ParseError<'a>>
where
    F: Parser<&'a str, Output = O, Error = ParseError<'a>>,
{
    delimited(multispace0, inner, multispace0)
}

fn ident(input: &str) -> IResult<&str, &str> {
    ws(take_while1(|c: char| {
        c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
    }))
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, WeightExpr> {
    map(
        map_res(ws(digit1), |digits: &str| digits.parse::<Weight>()),
        WeightExpr::Literal,
    )
    .parse(input)
}

/// `#(token)` or `#(place, token)`
fn count(input: &str) -> IResult<&str, WeightExpr> {
    map(
        preceded(
            ws(char('#')),
            delimited(
                ws(char('(')),
                pair(ident, opt(preceded(ws(char(',')), ident))),
                ws(char(')')),
            ),
        ),
        |(first, second)| match second {
            None => WeightExpr::count(first),
            Some(token) => WeightExpr::count_at(first, token),
        },
    )
    .parse(input)
}

fn call(input: &str) -> IResult<&str, WeightExpr> {
    let (input, op) = ws(alt((
        value(BinOp::Min, tag("min")),
        value(BinOp::Max, tag("max")),
    )))
    .parse(input)?;
    let (input, (lhs, rhs)) = delimited(
        ws(char('(')),
        separated_pair(expr, ws(char(',')), expr),
        ws(char(')')),
    )
    .parse(input)?;
    Ok((input, WeightExpr::binary(op, lhs, rhs)))
}

fn factor(input: &str) -> IResult<&str, WeightExpr> {
    alt((
        literal,
        count,
        call,
        delimited(ws(char('(')), expr, ws(char(')'))),
    ))
    .parse(input)
}

fn fold(first: WeightExpr, rest: Vec<(char, WeightExpr)>) -> WeightExpr {
    rest.into_iter().fold(first, |lhs, (symbol, rhs)| {
        let op = match symbol {
            '+' => BinOp::Add,
            '-' => BinOp::Sub,
            '*' => BinOp::Mul,
            _ => BinOp::Div,
        };
        WeightExpr::binary(op, lhs, rhs)
    })
}

fn term(input: &str) -> IResult<&str, WeightExpr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(pair(ws(one_of("*/")), factor)).parse(input)?;
    Ok((input, fold(first, rest)))
}

fn expr(input: &str) -> IResult<&str, WeightExpr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(one_of("+-")), term)).parse(input)?;
    Ok((input, fold(first, rest)))
}

/// Resolves the weights of whole arcs against one marking.
pub struct ArcWeightEvaluator<'a> {
    tokens: &'a IndexMap<TokenId, TokenKind>,
    marking: &'a Marking,
}

impl<'a> ArcWeightEvaluator<'a> {
    pub fn new(tokens: &'a IndexMap<TokenId, TokenKind>, marking: &'a Marking) -> Self {
        Self { tokens, marking }
    }

    /// Tokens per kind that firing would move across `arc`. For an
    /// inhibitor arc these are the thresholds.
    pub fn evaluate(&self, arc: &Arc) -> Result<TokenCounts, NetError> {
        let ctx = EvalContext {
            place: arc.place(),
            marking: self.marking,
            tokens: self.tokens,
        };
        let mut amounts = TokenCounts::new();
        for (token, expr) in arc.weights() {
            let invalid = |source| NetError::InvalidArcWeight {
                arc: arc.id().clone(),
                token: token.clone(),
                source,
            };
            if !self.tokens.contains_key(token.as_str()) {
                return Err(invalid(WeightError::UnknownToken(token.clone())));
            }
            let amount = expr.evaluate(&ctx).map_err(invalid)?;
            amounts.insert(token.clone(), amount);
        }
        Ok(amounts)
    }
}
