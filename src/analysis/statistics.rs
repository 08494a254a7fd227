//! Summary statistics over a sample set.

use crate::formula::ast::Property;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator); zero for a single sample.
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
    pub p5: f64,
    pub p95: f64,
}

impl Summary {
    /// Returns `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let stdev = if count > 1 {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        Some(Self {
            count,
            mean,
            median: percentile(&sorted, 0.5),
            stdev,
            min: sorted[0],
            max: sorted[count - 1],
            p5: percentile(&sorted, 0.05),
            p95: percentile(&sorted, 0.95),
        })
    }

    pub fn get(&self, property: Property) -> f64 {
        match property {
            Property::Mean => self.mean,
            Property::Median => self.median,
            Property::Stdev => self.stdev,
            Property::Min => self.min,
            Property::Max => self.max,
            Property::P5 => self.p5,
            Property::P95 => self.p95,
        }
    }
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
