//! Graph algorithms and sample statistics used by the engine.
pub mod statistics;
pub mod topology;

pub use statistics::Summary;
pub use topology::{cycles, downstream_from, layer, upstream_from, Layering};
