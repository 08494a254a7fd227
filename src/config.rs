//! Simulation settings with compiled defaults, loadable from JSON.

use crate::compute::SimulationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io { path: String, source: std::io::Error },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Settings for a [`Simulator`](crate::compute::Simulator). Missing fields
/// take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sample count used by callers that do not pick one.
    pub default_sample_count: usize,
    /// Upper bound on N for a single run.
    pub max_sample_count: usize,
    /// Fixed seed for reproducible runs. A fresh seed is drawn per run when
    /// absent.
    pub seed: Option<u64>,
    /// Sample counts at or above this are evaluated in parallel.
    pub parallel_threshold: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_sample_count: 5000,
            max_sample_count: 1_000_000,
            seed: None,
            parallel_threshold: 1024,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_json_str(&text)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sample_count == 0 {
            return Err(ConfigError::Invalid { field: "max_sample_count", message: "must be at least 1".into() });
        }
        if !(1..=self.max_sample_count).contains(&self.default_sample_count) {
            return Err(ConfigError::Invalid {
                field: "default_sample_count",
                message: format!("must be between 1 and max_sample_count ({})", self.max_sample_count),
            });
        }
        Ok(())
    }

    /// Resolves a caller-supplied sample count, falling back to
    /// `default_sample_count`. Counts below 1 are rejected.
    pub fn sample_count_or_default(&self, requested: Option<i64>) -> Result<usize, SimulationError> {
        let n = match requested {
            None => self.default_sample_count,
            Some(n) if n < 1 => return Err(SimulationError::InvalidSampleCount { requested: n }),
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };
        self.check_sample_count(n)?;
        Ok(n)
    }

    pub fn check_sample_count(&self, n: usize) -> Result<(), SimulationError> {
        if n == 0 {
            return Err(SimulationError::InvalidSampleCount { requested: 0 });
        }
        if n > self.max_sample_count {
            return Err(SimulationError::SampleCountTooLarge { requested: n, max: self.max_sample_count });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimulationConfig::from_json_str(r#"{"seed": 42}"#).unwrap();
        assert_eq!(config, SimulationConfig::default().with_seed(42));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_sample_count": 100, "default_sample_count": 10}}"#).unwrap();
        let config = SimulationConfig::from_path(file.path()).unwrap();
        assert_eq!(config.max_sample_count, 100);
        assert_eq!(config.default_sample_count, 10);

        let missing = SimulationConfig::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[rstest]
    #[case(r#"{"max_sample_count": 0}"#)]
    #[case(r#"{"default_sample_count": 0}"#)]
    #[case(r#"{"max_sample_count": 10, "default_sample_count": 11}"#)]
    fn test_invalid_values_rejected(#[case] json: &str) {
        assert!(matches!(SimulationConfig::from_json_str(json), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(SimulationConfig::from_json_str("{seed"), Err(ConfigError::Json(_))));
    }

    #[rstest]
    #[case(0, Err(SimulationError::InvalidSampleCount { requested: 0 }))]
    #[case(1, Ok(()))]
    #[case(1_000_000, Ok(()))]
    #[case(1_000_001, Err(SimulationError::SampleCountTooLarge { requested: 1_000_001, max: 1_000_000 }))]
    fn test_sample_count_bounds(#[case] n: usize, #[case] expected: Result<(), SimulationError>) {
        assert_eq!(SimulationConfig::default().check_sample_count(n), expected);
    }

    #[rstest]
    #[case(None, Ok(5000))]
    #[case(Some(250), Ok(250))]
    #[case(Some(0), Err(SimulationError::InvalidSampleCount { requested: 0 }))]
    #[case(Some(-3), Err(SimulationError::InvalidSampleCount { requested: -3 }))]
    #[case(Some(2_000_000), Err(SimulationError::SampleCountTooLarge { requested: 2_000_000, max: 1_000_000 }))]
    fn test_sample_count_or_default(#[case] requested: Option<i64>, #[case] expected: Result<usize, SimulationError>) {
        assert_eq!(SimulationConfig::default().sample_count_or_default(requested), expected);
    }
}
