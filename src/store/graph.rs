//! The normalized graph aggregate and its value-level operations.

use super::metric::{denormalize, DenormalizedGraph};
use super::types::{Guesstimate, Metric, MetricId, Sample, Simulation};
use crate::compute::{MetricOutcome, SimulationError, SimulationResult, Simulator, Target};
use crate::config::SimulationConfig;
use crate::formula::{Evaluator, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const GRAPH_FIELDS: [&str; 3] = ["metrics", "guesstimates", "simulations"];

/// Metrics, their guesstimates, and optional prior simulation records.
///
/// A graph is a plain value: every operation that "changes" it returns a new
/// graph and leaves the receiver untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub guesstimates: Vec<Guesstimate>,
    #[serde(default)]
    pub simulations: Vec<Simulation>,
}

impl Graph {
    pub fn new(metrics: Vec<Metric>, guesstimates: Vec<Guesstimate>) -> Self {
        Self { metrics, guesstimates, simulations: Vec::new() }
    }

    /// Projects an arbitrary record onto the graph fields. Unrecognized keys
    /// are dropped and missing collections default to empty; a non-object
    /// record yields an empty graph. Referential integrity is not checked.
    pub fn create(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let serde_json::Value::Object(mut record) = raw else {
            return Ok(Self::default());
        };
        let picked: serde_json::Map<String, serde_json::Value> = GRAPH_FIELDS
            .iter()
            .filter_map(|k| record.remove(*k).map(|v| (k.to_string(), v)))
            .collect();
        serde_json::from_value(serde_json::Value::Object(picked))
    }

    pub fn lookup_metric(&self, id: &MetricId) -> Option<&Metric> {
        self.metrics.iter().find(|m| &m.id == id)
    }

    pub fn guesstimate_for(&self, id: &MetricId) -> Option<&Guesstimate> {
        self.guesstimates.iter().find(|g| &g.metric == id)
    }

    pub fn simulation_for(&self, id: &MetricId) -> Option<&Simulation> {
        self.simulations.iter().find(|s| &s.metric == id)
    }

    pub fn denormalize(&self) -> DenormalizedGraph {
        DenormalizedGraph { metrics: self.metrics.iter().map(|m| denormalize(m, self)).collect() }
    }

    /// The "bizarro" graph: an independent copy where the owner of
    /// `guesstimate` has it as its only guesstimate.
    pub fn counterfactual_substitute(&self, guesstimate: Guesstimate) -> Graph {
        let mut bizarro = self.clone();
        bizarro.guesstimates.retain(|g| g.metric != guesstimate.metric);
        bizarro.guesstimates.push(guesstimate);
        bizarro
    }

    /// Checks the invariants a simulation relies on: unique metric ids, at
    /// most one guesstimate per metric, no dangling guesstimates.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let mut ids = HashSet::with_capacity(self.metrics.len());
        for m in &self.metrics {
            if !ids.insert(&m.id) {
                return Err(SimulationError::DuplicateMetricId(m.id.clone()));
            }
        }
        let mut owners = HashSet::with_capacity(self.guesstimates.len());
        for g in &self.guesstimates {
            if !ids.contains(&g.metric) {
                return Err(SimulationError::DanglingGuesstimate(g.metric.clone()));
            }
            if !owners.insert(&g.metric) {
                return Err(SimulationError::DuplicateGuesstimate(g.metric.clone()));
            }
        }
        Ok(())
    }

    /// Validates, denormalizes and simulates with the default configuration.
    pub fn run_simulation(&self, target: &Target, sample_count: usize) -> Result<SimulationResult, SimulationError> {
        self.run_simulation_with(&Simulator::new(SimulationConfig::default()), target, sample_count)
    }

    pub fn run_simulation_with<E: Evaluator>(
        &self,
        simulator: &Simulator<E>,
        target: &Target,
        sample_count: usize,
    ) -> Result<SimulationResult, SimulationError> {
        self.validate()?;
        simulator.run(&self.denormalize(), target, sample_count)
    }

    /// A copy whose simulation records reflect `result`. Metrics the run did
    /// not report keep their previous record.
    ///
    /// Records hold numbers only, so boolean samples are written as `1.0` and
    /// `0.0`. A later run reads them back as numbers.
    pub fn with_results(&self, result: &SimulationResult) -> Graph {
        let mut next = self.clone();
        next.simulations.retain(|s| result.get(&s.metric).is_none());
        for (id, outcome) in result.iter() {
            let sample = match outcome {
                MetricOutcome::Evaluated { samples } => Sample {
                    values: samples
                        .values()
                        .iter()
                        .map(|v| match v {
                            Value::Number(n) => *n,
                            Value::Bool(b) => f64::from(u8::from(*b)),
                        })
                        .collect(),
                    errors: Vec::new(),
                },
                MetricOutcome::Errored { error } => Sample { values: Vec::new(), errors: vec![error.to_string()] },
                MetricOutcome::Skipped { .. } => continue,
            };
            next.simulations.push(Simulation { metric: id.clone(), sample });
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::MetricErrorKind;
    use serde_json::json;

    fn two_metric_graph() -> Graph {
        Graph::new(
            vec![Metric::new("m1", "A"), Metric::new("m2", "B")],
            vec![Guesstimate::new("m1", "5"), Guesstimate::new("m2", "@A + 1")],
        )
    }

    #[test]
    fn test_create_keeps_only_graph_fields() {
        let raw = json!({
            "metrics": [{"id": "m1", "readableId": "A", "layout": {"row": 1}}],
            "guesstimates": [{"metric": "m1", "input": "3", "guesstimateType": "POINT"}],
            "owner": "someone",
            "isPrivate": true,
        });
        let g = Graph::create(raw).unwrap();
        assert_eq!(g.metrics, vec![Metric::new("m1", "A")]);
        assert_eq!(g.guesstimates, vec![Guesstimate::new("m1", "3")]);
        assert!(g.simulations.is_empty());
        assert_eq!(Graph::create(json!("nope")).unwrap(), Graph::default());
    }

    #[test]
    fn test_create_does_not_check_integrity() {
        let raw = json!({"guesstimates": [{"metric": "ghost", "input": "1"}]});
        let g = Graph::create(raw).unwrap();
        assert_eq!(g.validate(), Err(SimulationError::DanglingGuesstimate(MetricId::new("ghost"))));
    }

    #[test]
    fn test_lookup_metric_absent_is_none() {
        let g = two_metric_graph();
        assert_eq!(g.lookup_metric(&"m2".into()).map(|m| m.readable_id.as_str()), Some("B"));
        assert!(g.lookup_metric(&"zzz".into()).is_none());
    }

    #[test]
    fn test_counterfactual_substitute_leaves_source_untouched() {
        let source = two_metric_graph();
        let snapshot = source.clone();
        let mut bizarro = source.counterfactual_substitute(Guesstimate::new("m1", "50"));

        assert_eq!(source, snapshot);
        assert_eq!(bizarro.guesstimates.len(), 2);
        assert_eq!(bizarro.guesstimate_for(&"m1".into()).and_then(|g| g.formula()), Some("50"));

        bizarro.metrics[0].readable_id = "changed".into();
        assert_eq!(source.metrics[0].readable_id, "A");

        let original = source.run_simulation(&Target::All, 10).unwrap();
        let counterfactual = source.counterfactual_substitute(Guesstimate::new("m1", "50")).run_simulation(&Target::All, 10).unwrap();
        assert_eq!(original.samples(&"m2".into()).and_then(|s| s.numbers()), Some(vec![6.0; 10]));
        assert_eq!(counterfactual.samples(&"m2".into()).and_then(|s| s.numbers()), Some(vec![51.0; 10]));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut g = two_metric_graph();
        g.guesstimates.push(Guesstimate::new("m2", "2"));
        assert_eq!(g.validate(), Err(SimulationError::DuplicateGuesstimate("m2".into())));

        let mut g = two_metric_graph();
        g.metrics.push(Metric::new("m1", "C"));
        assert_eq!(g.validate(), Err(SimulationError::DuplicateMetricId("m1".into())));
    }

    #[test]
    fn test_run_simulation_rejects_bad_input_before_evaluating() {
        let g = two_metric_graph();
        assert_eq!(g.run_simulation(&Target::All, 0).unwrap_err(), SimulationError::InvalidSampleCount { requested: 0 });

        let mut dangling = two_metric_graph();
        dangling.guesstimates.push(Guesstimate::new("ghost", "1"));
        assert_eq!(
            dangling.run_simulation(&Target::All, 5).unwrap_err(),
            SimulationError::DanglingGuesstimate("ghost".into())
        );
    }

    #[test]
    fn test_with_results_feeds_back_into_denormalized_view() {
        let mut g = two_metric_graph();
        g.metrics.push(Metric::new("m3", "C"));
        g.guesstimates.push(Guesstimate::new("m3", "@Nope"));

        let result = g.run_simulation(&Target::All, 3).unwrap();
        assert_eq!(result.error(&"m3".into()).map(|e| e.kind), Some(MetricErrorKind::UnknownReference));

        let next = g.with_results(&result);
        let view = next.denormalize();
        assert_eq!(view.metric(&"m1".into()).and_then(|m| m.prior_values()), Some(&[5.0, 5.0, 5.0][..]));
        let c = view.metric(&"m3".into()).and_then(|m| m.simulation.clone()).unwrap();
        assert!(c.sample.values.is_empty());
        assert!(c.sample.errors[0].contains("unknown reference"));
        assert!(g.simulations.is_empty());
    }

    #[test]
    fn test_with_results_writes_booleans_as_numbers() {
        let mut g = two_metric_graph();
        g.metrics.push(Metric::new("m3", "C"));
        g.guesstimates.push(Guesstimate::new("m3", "2 > 1"));

        let result = g.run_simulation(&Target::All, 2).unwrap();
        let next = g.with_results(&result);
        let c = next.simulations.iter().find(|s| s.metric == MetricId::from("m3")).unwrap();
        assert_eq!(c.sample.values, vec![1.0, 1.0]);
        assert!(c.sample.errors.is_empty());
    }
}
