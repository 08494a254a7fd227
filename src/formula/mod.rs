//! The guesstimate formula language: parsing and per-sample evaluation.
pub mod ast;
pub mod distributions;
pub mod eval;
pub mod parser;

pub use ast::{BinaryOp, Expr, Function, Property, RefName, Slot, UnaryOp};
pub use eval::{DependencyView, EvalError, Evaluator, SampleContext, SampleRng, StandardEvaluator, Value};
pub use parser::{parse_data, parse_formula, ParseError};
