//! The normalized graph model: metrics, guesstimates and prior simulations.
pub mod graph;
pub mod metric;
pub mod types;

pub use graph::Graph;
pub use metric::{denormalize, DenormalizedGraph, DenormalizedMetric};
pub use types::{Guesstimate, Metric, MetricId, Sample, Simulation};
