//! Planning and execution of simulation runs.
pub mod engine;
pub mod error;
pub mod ledger;
pub mod plan;
pub mod result;

pub use engine::{simulate, CancellationToken, Simulator};
pub use error::{MetricError, MetricErrorKind, SimulationError};
pub use ledger::{Ledger, MetricOutcome, SampleSet, SkipReason};
pub use plan::{PlannedKind, PlannedMetric, SimulationPlan, Target};
pub use result::SimulationResult;
