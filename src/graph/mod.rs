//! The derived dependency graph between metrics.
pub mod storage;

pub use storage::{DependencyGraph, NodeId};
