use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable unique identifier of a metric. Distinct from the readable id used
/// inside formulas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(pub String);

impl MetricId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for MetricId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: MetricId,
    /// The name written after `@` in other metrics' formulas.
    pub readable_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Metric {
    pub fn new(id: impl Into<String>, readable_id: impl Into<String>) -> Self {
        Self { id: MetricId::new(id), readable_id: readable_id.into(), name: None }
    }
}

/// The formula attached to a single metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guesstimate {
    pub metric: MetricId,
    #[serde(default)]
    pub input: Option<String>,
}

impl Guesstimate {
    pub fn new(metric: impl Into<String>, input: impl Into<String>) -> Self {
        Self { metric: MetricId::new(metric), input: Some(input.into()) }
    }

    /// The formula text, or `None` when absent or blank.
    pub fn formula(&self) -> Option<&str> {
        self.input.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A simulation outcome recorded against a metric, either from a previous run
/// or supplied by the caller as observed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub metric: MetricId,
    #[serde(default)]
    pub sample: Sample,
}

impl Simulation {
    pub fn has_values(&self) -> bool {
        self.sample.errors.is_empty() && !self.sample.values.is_empty()
    }
}
