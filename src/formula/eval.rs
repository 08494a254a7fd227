//! Per-sample evaluation of resolved formulas.

use super::ast::{BinaryOp, Expr, Function, Slot, UnaryOp};
use super::distributions as dist;
use crate::analysis::statistics::Summary;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Random stream handed to the evaluator for one (metric, sample index) pair.
pub type SampleRng = ChaCha8Rng;

/// A single sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
        }
    }

    pub fn as_number(&self) -> Result<f64, EvalError> {
        match *self {
            Value::Number(n) => Ok(n),
            other => Err(EvalError::TypeMismatch { expected: "number", found: other.type_name() }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match *self {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::TypeMismatch { expected: "boolean", found: other.type_name() }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("invalid argument to {func}: {reason}")]
    InvalidArgument { func: &'static str, reason: String },
    #[error("result is not a finite number")]
    NonFinite,
    #[error("property '{property}' requires a numeric dependency")]
    UnavailableProperty { property: &'static str },
    #[error("no value for dependency slot {0}")]
    MissingDependency(usize),
}

/// What a formula may read from one of its dependencies.
#[derive(Debug, Clone, Copy)]
pub struct DependencyView<'a> {
    pub samples: &'a [Value],
    /// Present when the dependency is numeric.
    pub summary: Option<&'a Summary>,
}

/// Inputs for evaluating one formula at one sample index.
#[derive(Debug, Clone, Copy)]
pub struct SampleContext<'a> {
    pub index: usize,
    pub dependencies: &'a [DependencyView<'a>],
}

/// Evaluates a resolved formula for one sample. Implementations must be pure
/// functions of the expression, the context and the random stream.
pub trait Evaluator: Sync {
    fn evaluate(&self, expr: &Expr<Slot>, ctx: &SampleContext<'_>, rng: &mut SampleRng) -> Result<Value, EvalError>;
}

/// The built-in arithmetic, comparison and distribution semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEvaluator;

impl Evaluator for StandardEvaluator {
    fn evaluate(&self, expr: &Expr<Slot>, ctx: &SampleContext<'_>, rng: &mut SampleRng) -> Result<Value, EvalError> {
        let value = eval(expr, ctx, rng)?;
        match value {
            Value::Number(n) if !n.is_finite() => Err(EvalError::NonFinite),
            v => Ok(v),
        }
    }
}

fn eval(expr: &Expr<Slot>, ctx: &SampleContext<'_>, rng: &mut SampleRng) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Data(points) => Ok(Value::Number(dist::resample(rng, points))),
        Expr::Reference(slot) => lookup(slot, ctx),
        Expr::Unary { op: UnaryOp::Neg, operand } => Ok(Value::Number(-eval(operand, ctx, rng)?.as_number()?)),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, ctx, rng)?;
            let r = eval(rhs, ctx, rng)?;
            binary(*op, l, r)
        }
        Expr::Range { low, high } => {
            let lo = eval(low, ctx, rng)?.as_number()?;
            let hi = eval(high, ctx, rng)?.as_number()?;
            dist::normal_ci90(rng, lo, hi).map(Value::Number)
        }
        Expr::Call { func: Function::If, args } => {
            let cond = eval(&args[0], ctx, rng)?.as_bool()?;
            eval(if cond { &args[1] } else { &args[2] }, ctx, rng)
        }
        Expr::Call { func, args } => {
            let nums = args
                .iter()
                .map(|a| eval(a, ctx, rng)?.as_number())
                .collect::<Result<Vec<f64>, _>>()?;
            call(*func, &nums, rng).map(Value::Number)
        }
    }
}

fn lookup(slot: &Slot, ctx: &SampleContext<'_>) -> Result<Value, EvalError> {
    let dep = ctx.dependencies.get(slot.index).ok_or(EvalError::MissingDependency(slot.index))?;
    match slot.property {
        None => dep.samples.get(ctx.index).copied().ok_or(EvalError::MissingDependency(slot.index)),
        Some(p) => dep
            .summary
            .map(|s| Value::Number(s.get(p)))
            .ok_or(EvalError::UnavailableProperty { property: p.name() }),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    if let (BinaryOp::Eq | BinaryOp::Ne, Value::Bool(a), Value::Bool(b)) = (op, l, r) {
        return Ok(Value::Bool((a == b) == (op == BinaryOp::Eq)));
    }
    let (a, b) = (l.as_number()?, r.as_number()?);
    Ok(match op {
        BinaryOp::Add => Value::Number(a + b),
        BinaryOp::Sub => Value::Number(a - b),
        BinaryOp::Mul => Value::Number(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Number(a / b)
        }
        BinaryOp::Pow => Value::Number(a.powf(b)),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
    })
}

fn call(func: Function, args: &[f64], rng: &mut SampleRng) -> Result<f64, EvalError> {
    match func {
        Function::Normal => dist::normal(rng, args[0], args[1]),
        Function::Uniform => dist::uniform(rng, args[0], args[1]),
        Function::Lognormal => dist::lognormal_ci90(rng, args[0], args[1]),
        Function::Triangular => dist::triangular(rng, args[0], args[1], args[2]),
        Function::Bernoulli => dist::bernoulli(rng, args[0]),
        Function::Min => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        Function::Max => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        Function::Abs => Ok(args[0].abs()),
        Function::Sqrt if args[0] < 0.0 => Err(domain(func, args[0])),
        Function::Sqrt => Ok(args[0].sqrt()),
        Function::Exp => Ok(args[0].exp()),
        Function::Ln | Function::Log10 if args[0] <= 0.0 => Err(domain(func, args[0])),
        Function::Ln => Ok(args[0].ln()),
        Function::Log10 => Ok(args[0].log10()),
        Function::Round => Ok(args[0].round()),
        Function::Floor => Ok(args[0].floor()),
        Function::Ceil => Ok(args[0].ceil()),
        // Handled lazily by `eval`.
        Function::If => Err(EvalError::TypeMismatch { expected: "boolean", found: "number" }),
    }
}

fn domain(func: Function, x: f64) -> EvalError {
    EvalError::InvalidArgument { func: func.name(), reason: format!("{x} is outside the domain") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ast::Property;
    use crate::formula::parser::parse_formula;
    use rand::SeedableRng;

    /// Parses `text`, mapping reference `@dN` to slot N.
    fn compile(text: &str) -> Expr<Slot> {
        parse_formula(text)
            .unwrap()
            .try_map_refs(&mut |r| {
                let index = r.ident.trim_start_matches('d').parse().map_err(|_| ())?;
                let property = r.properties.first().and_then(|p| Property::from_name(p));
                Ok::<_, ()>(Slot { index, property })
            })
            .unwrap()
    }

    fn run(text: &str, deps: &[DependencyView<'_>], index: usize) -> Result<Value, EvalError> {
        let ctx = SampleContext { index, dependencies: deps };
        let mut rng = SampleRng::seed_from_u64(42);
        StandardEvaluator.evaluate(&compile(text), &ctx, &mut rng)
    }

    #[test]
    fn test_arithmetic_reads_the_matching_sample_index() {
        let a = [Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)];
        let deps = [DependencyView { samples: &a, summary: None }];
        assert_eq!(run("@d0 * 10 + 1", &deps, 2), Ok(Value::Number(31.0)));
        assert_eq!(run("-@d0 ^ 2", &deps, 1), Ok(Value::Number(-4.0)));
    }

    #[test]
    fn test_properties_use_the_summary() {
        let a = [Value::Number(1.0), Value::Number(3.0)];
        let summary = Summary::from_values(&[1.0, 3.0]).unwrap();
        let deps = [DependencyView { samples: &a, summary: Some(&summary) }];
        assert_eq!(run("@d0.mean", &deps, 0), Ok(Value::Number(2.0)));
        let no_summary = [DependencyView { samples: &a, summary: None }];
        assert_eq!(run("@d0.max", &no_summary, 0), Err(EvalError::UnavailableProperty { property: "max" }));
    }

    #[test]
    fn test_comparisons_and_conditionals() {
        assert_eq!(run("if(2 > 1, 10, 20)", &[], 0), Ok(Value::Number(10.0)));
        assert_eq!(run("(1 < 2) == (3 < 4)", &[], 0), Ok(Value::Bool(true)));
        assert_eq!(
            run("if(1, 2, 3)", &[], 0),
            Err(EvalError::TypeMismatch { expected: "boolean", found: "number" })
        );
    }

    #[test]
    fn test_type_mismatch_between_bool_and_number() {
        let b = [Value::Bool(true)];
        let deps = [DependencyView { samples: &b, summary: None }];
        assert_eq!(
            run("@d0 + 1", &deps, 0),
            Err(EvalError::TypeMismatch { expected: "number", found: "boolean" })
        );
    }

    #[test]
    fn test_runtime_failures() {
        assert_eq!(run("1 / 0", &[], 0), Err(EvalError::DivisionByZero));
        assert!(matches!(run("sqrt(-4)", &[], 0), Err(EvalError::InvalidArgument { func: "sqrt", .. })));
        assert!(matches!(run("ln(0)", &[], 0), Err(EvalError::InvalidArgument { func: "ln", .. })));
        assert_eq!(run("10 ^ 400", &[], 0), Err(EvalError::NonFinite));
    }

    #[test]
    fn test_same_stream_gives_same_draw() {
        assert_eq!(run("normal(0, 1)", &[], 0), run("normal(0, 1)", &[], 0));
        assert_eq!(run("5 to 5", &[], 0), Ok(Value::Number(5.0)));
        assert_eq!(run("max(1, 7, 3)", &[], 0), Ok(Value::Number(7.0)));
    }
}
