//! Human-readable renderings of simulation results.
pub mod trace;

pub use trace::format_trace;
