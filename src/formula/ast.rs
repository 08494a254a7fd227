//! Expression tree for guesstimate formulas.
//!
//! `Expr` is generic over its reference payload: the parser produces
//! `Expr<RefName>` (names as written), the planner resolves those into
//! `Expr<Slot>` (positions in the metric's dependency list).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Summary statistic of a dependency's full sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Property {
    Mean,
    Median,
    Stdev,
    Min,
    Max,
    P5,
    P95,
}

impl Property {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mean" => Some(Self::Mean),
            "median" => Some(Self::Median),
            "stdev" => Some(Self::Stdev),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "p5" => Some(Self::P5),
            "p95" => Some(Self::P95),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Stdev => "stdev",
            Self::Min => "min",
            Self::Max => "max",
            Self::P5 => "p5",
            Self::P95 => "p95",
        }
    }
}

/// A reference as written in the formula: `@ident.prop1.prop2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefName {
    pub ident: String,
    pub properties: Vec<String>,
}

/// A resolved reference into the owning metric's dependency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub property: Option<Property>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Normal,
    Uniform,
    Lognormal,
    Triangular,
    Bernoulli,
    Min,
    Max,
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Round,
    Floor,
    Ceil,
    If,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let f = match name.to_ascii_lowercase().as_str() {
            "normal" => Self::Normal,
            "uniform" => Self::Uniform,
            "lognormal" => Self::Lognormal,
            "triangular" => Self::Triangular,
            "bernoulli" => Self::Bernoulli,
            "min" => Self::Min,
            "max" => Self::Max,
            "abs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "log10" => Self::Log10,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "if" => Self::If,
            _ => return None,
        };
        Some(f)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Uniform => "uniform",
            Self::Lognormal => "lognormal",
            Self::Triangular => "triangular",
            Self::Bernoulli => "bernoulli",
            Self::Min => "min",
            Self::Max => "max",
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Log10 => "log10",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::If => "if",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Normal | Self::Uniform | Self::Lognormal => Arity::Exact(2),
            Self::Triangular | Self::If => Arity::Exact(3),
            Self::Min | Self::Max => Arity::AtLeast(1),
            Self::Bernoulli
            | Self::Abs
            | Self::Sqrt
            | Self::Exp
            | Self::Ln
            | Self::Log10
            | Self::Round
            | Self::Floor
            | Self::Ceil => Arity::Exact(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<R> {
    Number(f64),
    Reference(R),
    Unary { op: UnaryOp, operand: Box<Expr<R>> },
    Binary { op: BinaryOp, lhs: Box<Expr<R>>, rhs: Box<Expr<R>> },
    Call { func: Function, args: Vec<Expr<R>> },
    /// `low to high`: a normal distribution with that 90% confidence interval.
    Range { low: Box<Expr<R>>, high: Box<Expr<R>> },
    /// Observed data points, resampled uniformly.
    Data(Arc<[f64]>),
}

impl<R> Expr<R> {
    /// Rebuilds the tree with every reference passed through `f`.
    pub fn try_map_refs<T, E>(self, f: &mut impl FnMut(R) -> Result<T, E>) -> Result<Expr<T>, E> {
        Ok(match self {
            Expr::Number(n) => Expr::Number(n),
            Expr::Data(d) => Expr::Data(d),
            Expr::Reference(r) => Expr::Reference(f(r)?),
            Expr::Unary { op, operand } => Expr::Unary { op, operand: Box::new(operand.try_map_refs(f)?) },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op,
                lhs: Box::new(lhs.try_map_refs(f)?),
                rhs: Box::new(rhs.try_map_refs(f)?),
            },
            Expr::Call { func, args } => Expr::Call {
                func,
                args: args.into_iter().map(|a| a.try_map_refs(f)).collect::<Result<_, _>>()?,
            },
            Expr::Range { low, high } => Expr::Range {
                low: Box::new(low.try_map_refs(f)?),
                high: Box::new(high.try_map_refs(f)?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::PROPERTY_NAMES;

    #[test]
    fn test_property_names_round_trip_with_reference_tooling() {
        for name in PROPERTY_NAMES {
            let p = Property::from_name(name).expect("every suggested property is evaluable");
            assert_eq!(p.name(), *name);
        }
    }

    #[test]
    fn test_function_lookup_is_case_insensitive() {
        assert_eq!(Function::from_name("Normal"), Some(Function::Normal));
        assert_eq!(Function::from_name("nope"), None);
        assert!(Function::Min.arity().accepts(4));
        assert!(!Function::If.arity().accepts(2));
    }

    #[test]
    fn test_map_refs_preserves_shape() {
        let expr: Expr<&str> = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::Reference("a")),
            rhs: Box::new(Expr::Number(1.0)),
        };
        let mapped: Expr<usize> = expr.try_map_refs(&mut |r: &str| Ok::<_, ()>(r.len())).unwrap();
        assert_eq!(
            mapped,
            Expr::Binary { op: BinaryOp::Add, lhs: Box::new(Expr::Reference(1)), rhs: Box::new(Expr::Number(1.0)) }
        );

        let failing: Expr<&str> = Expr::Call { func: Function::Max, args: vec![Expr::Number(2.0), Expr::Reference("x")] };
        assert_eq!(failing.try_map_refs(&mut |r: &str| Err::<usize, _>(r.to_string())), Err("x".to_string()));
    }
}
