use super::error::MetricError;
use super::ledger::{MetricOutcome, SampleSet};
use crate::store::MetricId;
use serde::Serialize;
use std::collections::HashMap;

/// Output of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub sample_count: usize,
    /// Seed the run's random streams were derived from. Re-running with it
    /// reproduces every sample.
    pub seed: u64,
    /// Every reported metric: evaluation order first, then metrics that were
    /// never scheduled because of a cycle.
    order: Vec<MetricId>,
    outcomes: HashMap<MetricId, MetricOutcome>,
}

impl SimulationResult {
    pub(crate) fn new(sample_count: usize, seed: u64, entries: Vec<(MetricId, MetricOutcome)>) -> Self {
        let order = entries.iter().map(|(id, _)| id.clone()).collect();
        Self { sample_count, seed, order, outcomes: entries.into_iter().collect() }
    }

    pub fn get(&self, id: &MetricId) -> Option<&MetricOutcome> {
        self.outcomes.get(id)
    }

    pub fn samples(&self, id: &MetricId) -> Option<&SampleSet> {
        self.get(id).and_then(MetricOutcome::samples)
    }

    pub fn error(&self, id: &MetricId) -> Option<&MetricError> {
        self.get(id).and_then(MetricOutcome::error)
    }

    pub fn order(&self) -> &[MetricId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Outcomes in report order.
    pub fn iter(&self) -> impl Iterator<Item = (&MetricId, &MetricOutcome)> + '_ {
        self.order.iter().filter_map(|id| self.outcomes.get(id).map(|o| (id, o)))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&MetricId, &MetricError)> + '_ {
        self.iter().filter_map(|(id, o)| o.error().map(|e| (id, e)))
    }
}
