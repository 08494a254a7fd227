//! ledger.rs
//! Per-run storage of metric outcomes, indexed densely by node.

use super::error::MetricError;
use crate::analysis::statistics::Summary;
use crate::formula::{DependencyView, Value};
use crate::graph::NodeId;
use crate::store::MetricId;
use serde::Serialize;

/// The N sampled values of one metric. Sample `i` of every metric in a run
/// was computed from sample `i` of its dependencies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSet {
    values: Vec<Value>,
    /// Present when every value is numeric.
    summary: Option<Summary>,
}

impl SampleSet {
    pub fn new(values: Vec<Value>) -> Self {
        let summary = numbers(&values).and_then(|n| Summary::from_values(&n));
        Self { values, summary }
    }

    pub fn from_numbers(values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(values.into_iter().map(Value::Number).collect())
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn values(&self) -> &[Value] { &self.values }

    pub fn get(&self, index: usize) -> Option<Value> { self.values.get(index).copied() }

    pub fn summary(&self) -> Option<&Summary> { self.summary.as_ref() }

    /// The values as plain numbers, or `None` if any is not numeric.
    pub fn numbers(&self) -> Option<Vec<f64>> { numbers(&self.values) }

    pub(crate) fn view(&self) -> DependencyView<'_> {
        DependencyView { samples: &self.values, summary: self.summary.as_ref() }
    }
}

fn numbers(values: &[Value]) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|v| match v {
            Value::Number(n) => Some(*n),
            Value::Bool(_) => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// No formula and no prior values.
    NoFormula,
    /// A dependency (transitively) has no data.
    MissingInput { metric: MetricId },
}

/// Terminal state of a metric after one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MetricOutcome {
    Evaluated { samples: SampleSet },
    Errored { error: MetricError },
    Skipped { reason: SkipReason },
}

impl MetricOutcome {
    pub fn samples(&self) -> Option<&SampleSet> {
        match self {
            MetricOutcome::Evaluated { samples } => Some(samples),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&MetricError> {
        match self {
            MetricOutcome::Errored { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_errored(&self) -> bool { matches!(self, MetricOutcome::Errored { .. }) }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: Vec<Option<MetricOutcome>>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(size: usize) -> Self {
        Self { values: vec![None; size] }
    }

    #[inline(always)]
    pub fn get(&self, node_id: NodeId) -> Option<&MetricOutcome> {
        self.values.get(node_id.index())?.as_ref()
    }

    #[inline(always)]
    pub fn insert(&mut self, node_id: NodeId, outcome: MetricOutcome) {
        let idx = node_id.index();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, None);
        }
        self.values[idx] = Some(outcome);
    }

    pub fn take(&mut self, node_id: NodeId) -> Option<MetricOutcome> {
        self.values.get_mut(node_id.index())?.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_set_summary_only_for_numbers() {
        let numeric = SampleSet::from_numbers([1.0, 2.0, 3.0]);
        assert_eq!(numeric.summary().map(|s| s.mean), Some(2.0));
        assert_eq!(numeric.numbers(), Some(vec![1.0, 2.0, 3.0]));

        let mixed = SampleSet::new(vec![Value::Number(1.0), Value::Bool(true)]);
        assert!(mixed.summary().is_none());
        assert!(mixed.numbers().is_none());
        assert_eq!(mixed.get(1), Some(Value::Bool(true)));
    }

    #[test]
    fn test_ledger_grows_on_insert() {
        let mut ledger = Ledger::new();
        let outcome = MetricOutcome::Skipped { reason: SkipReason::NoFormula };
        ledger.insert(NodeId(3), outcome.clone());
        assert_eq!(ledger.get(NodeId(3)), Some(&outcome));
        assert_eq!(ledger.get(NodeId(0)), None);
        assert_eq!(ledger.take(NodeId(3)), Some(outcome));
        assert_eq!(ledger.get(NodeId(3)), None);
    }
}
