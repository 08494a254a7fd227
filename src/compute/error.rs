//! Error types for simulation runs.
//!
//! `SimulationError` rejects a whole request before evaluation starts.
//! `MetricError` is contained to one metric; a run that produces some never
//! fails as a whole.

use crate::store::MetricId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("sample count must be at least 1, got {requested}")]
    InvalidSampleCount { requested: i64 },
    #[error("sample count {requested} exceeds the configured maximum of {max}")]
    SampleCountTooLarge { requested: usize, max: usize },
    #[error("metric id '{0}' appears more than once")]
    DuplicateMetricId(MetricId),
    #[error("metric '{0}' has more than one guesstimate")]
    DuplicateGuesstimate(MetricId),
    #[error("guesstimate refers to unknown metric '{0}'")]
    DanglingGuesstimate(MetricId),
    #[error("target metric '{0}' does not exist")]
    UnknownTarget(MetricId),
    #[error("simulation was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricErrorKind {
    /// The formula text could not be parsed.
    Parse,
    /// A reference names no metric.
    UnknownReference,
    /// A reference names several metrics.
    AmbiguousReference,
    /// The metric is part of, or depends on, a dependency cycle.
    CircularDependency,
    /// Evaluating the formula failed for at least one sample.
    Evaluation,
    /// A dependency failed.
    Upstream,
}

impl fmt::Display for MetricErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse error",
            Self::UnknownReference => "unknown reference",
            Self::AmbiguousReference => "ambiguous reference",
            Self::CircularDependency => "circular dependency",
            Self::Evaluation => "evaluation error",
            Self::Upstream => "upstream error",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct MetricError {
    pub kind: MetricErrorKind,
    pub message: String,
    /// Metrics at the root of the failure. For `Upstream` this is the metric
    /// whose own error started the cascade.
    pub offending: Vec<MetricId>,
}

impl MetricError {
    pub fn new(kind: MetricErrorKind, message: impl Into<String>, offending: Vec<MetricId>) -> Self {
        Self { kind, message: message.into(), offending }
    }
}
