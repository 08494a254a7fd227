//! Dependency-graph Monte Carlo engine for guesstimate models.
//!
//! A [`Graph`] of metrics and formulas is planned into a layered dependency
//! graph and sampled N times; every metric ends up evaluated, errored or
//! skipped, without one failure affecting unrelated metrics.

pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod formula;
pub mod graph;
pub mod reference;
pub mod store;

// FFI Facade: the `_core` Python module, built with `--features python`.
#[cfg(feature = "python")]
mod bindings;

pub use compute::{
    simulate, CancellationToken, MetricError, MetricErrorKind, MetricOutcome, SampleSet, SimulationError,
    SimulationResult, Simulator, SkipReason, Target,
};
pub use config::{ConfigError, SimulationConfig};
pub use formula::{Evaluator, StandardEvaluator, Value};
pub use reference::{extract_references, resolve_params, ReferenceParams};
pub use store::{DenormalizedGraph, DenormalizedMetric, Graph, Guesstimate, Metric, MetricId, Sample, Simulation};
