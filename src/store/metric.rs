//! The presentation-oriented view of a metric: guesstimate and prior
//! simulation inlined.

use super::graph::Graph;
use super::types::{Guesstimate, Metric, MetricId, Simulation};
use crate::reference::extract_references;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenormalizedMetric {
    pub id: MetricId,
    pub readable_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub guesstimate: Option<Guesstimate>,
    pub simulation: Option<Simulation>,
}

impl DenormalizedMetric {
    pub fn formula(&self) -> Option<&str> {
        self.guesstimate.as_ref().and_then(Guesstimate::formula)
    }

    /// Readable ids referenced by the formula, recomputed from its text.
    pub fn references(&self) -> Vec<String> {
        self.formula().map(extract_references).unwrap_or_default()
    }

    /// Values from a previous, error-free simulation.
    pub fn prior_values(&self) -> Option<&[f64]> {
        self.simulation
            .as_ref()
            .filter(|s| s.has_values())
            .map(|s| s.sample.values.as_slice())
    }
}

/// Attaches the metric's guesstimate and simulation, if any. A metric without
/// a guesstimate is an input-only metric, not an error.
pub fn denormalize(metric: &Metric, graph: &Graph) -> DenormalizedMetric {
    DenormalizedMetric {
        id: metric.id.clone(),
        readable_id: metric.readable_id.clone(),
        name: metric.name.clone(),
        guesstimate: graph.guesstimate_for(&metric.id).cloned(),
        simulation: graph.simulation_for(&metric.id).cloned(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DenormalizedGraph {
    pub metrics: Vec<DenormalizedMetric>,
}

impl DenormalizedGraph {
    pub fn metric(&self, id: &MetricId) -> Option<&DenormalizedMetric> {
        self.metrics.iter().find(|m| &m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Sample;

    #[test]
    fn test_denormalize_inlines_guesstimate_and_simulation() {
        let mut graph = Graph::new(
            vec![Metric::new("m1", "A"), Metric::new("m2", "B")],
            vec![Guesstimate::new("m2", "@A * 2")],
        );
        graph.simulations.push(Simulation {
            metric: MetricId::new("m1"),
            sample: Sample { values: vec![1.0, 2.0], errors: vec![] },
        });

        let a = denormalize(&graph.metrics[0], &graph);
        assert_eq!(a.guesstimate, None);
        assert_eq!(a.prior_values(), Some(&[1.0, 2.0][..]));
        assert!(a.references().is_empty());

        let b = denormalize(&graph.metrics[1], &graph);
        assert_eq!(b.formula(), Some("@A * 2"));
        assert_eq!(b.references(), vec!["A".to_string()]);
        assert_eq!(b.prior_values(), None);
    }

    #[test]
    fn test_blank_input_counts_as_no_formula() {
        let graph = Graph::new(vec![Metric::new("m1", "A")], vec![Guesstimate::new("m1", "   ")]);
        assert_eq!(denormalize(&graph.metrics[0], &graph).formula(), None);
    }
}
