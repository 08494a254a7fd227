use crate::compute::{SimulationError, SimulationPlan, Simulator, Target};
use crate::config::SimulationConfig;
use crate::display::trace;
use crate::reference;
use crate::store::{Graph, Guesstimate, Metric, MetricId};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn value_err(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn target(metric: Option<String>) -> Target {
    metric.map(|id| Target::Metric(MetricId::new(id))).unwrap_or_default()
}

#[pyclass(name = "_Graph")]
#[derive(Debug, Clone, Default)]
pub struct PyGraph {
    inner: Graph,
    config: SimulationConfig,
}

#[pymethods]
impl PyGraph {
    #[new]
    pub fn new() -> Self { Self::default() }

    #[staticmethod]
    pub fn from_json(json: &str) -> PyResult<Self> {
        let raw: serde_json::Value = serde_json::from_str(json).map_err(value_err)?;
        let inner = Graph::create(raw).map_err(value_err)?;
        Ok(Self { inner, config: SimulationConfig::default() })
    }

    pub fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(value_err)
    }

    pub fn load_config(&mut self, json: &str) -> PyResult<()> {
        self.config = SimulationConfig::from_json_str(json).map_err(value_err)?;
        Ok(())
    }

    pub fn add_metric(&mut self, id: String, readable_id: String) -> PyResult<()> {
        let id = MetricId::new(id);
        if self.inner.lookup_metric(&id).is_some() {
            return Err(value_err(SimulationError::DuplicateMetricId(id)));
        }
        self.inner.metrics.push(Metric { id, readable_id, name: None });
        Ok(())
    }

    pub fn set_guesstimate(&mut self, metric: String, input: String) {
        self.inner = self.inner.counterfactual_substitute(Guesstimate::new(metric, input));
    }

    /// A copy of this graph with one guesstimate replaced.
    pub fn bizarro(&self, metric: String, input: String) -> Self {
        Self { inner: self.inner.counterfactual_substitute(Guesstimate::new(metric, input)), config: self.config.clone() }
    }

    pub fn metric_count(&self) -> usize { self.inner.metrics.len() }

    /// Runs a simulation and returns the result as JSON. Results are also
    /// written back as this graph's simulation records.
    #[pyo3(signature = (n=None, target=None, seed=None))]
    pub fn simulate(&mut self, py: Python<'_>, n: Option<i64>, target: Option<String>, seed: Option<u64>) -> PyResult<String> {
        let n = self.config.sample_count_or_default(n).map_err(value_err)?;
        let mut config = self.config.clone();
        if let Some(seed) = seed {
            config.seed = Some(seed);
        }
        let target = self::target(target);
        let graph = &self.inner;
        let result = py
            .detach(|| graph.run_simulation_with(&Simulator::new(config), &target, n))
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        let json = serde_json::to_string(&result).map_err(value_err)?;
        self.inner = self.inner.with_results(&result);
        Ok(json)
    }

    #[pyo3(signature = (metric, n=None, seed=None))]
    pub fn trace_metric(&self, metric: String, n: Option<i64>, seed: Option<u64>) -> PyResult<String> {
        let n = self.config.sample_count_or_default(n).map_err(value_err)?;
        self.inner.validate().map_err(value_err)?;
        let config = SimulationConfig { seed: seed.or(self.config.seed), ..self.config.clone() };
        let plan = SimulationPlan::build(&self.inner.denormalize(), &Target::All).map_err(value_err)?;
        let result = Simulator::new(config).execute(&plan, n).map_err(value_err)?;
        Ok(trace::format_trace(&plan, &result, &MetricId::new(metric)))
    }
}

#[pyfunction]
fn extract_references(text: &str) -> Vec<String> {
    reference::extract_references(text)
}

#[pyfunction]
fn resolve_params(partial: &str, candidates: Vec<String>) -> (String, Option<String>, Option<usize>, String) {
    let candidates: Vec<&str> = candidates.iter().map(String::as_str).collect();
    let p = reference::resolve_params(partial, &candidates);
    (p.partial_noun, p.partial_property, p.property_index, p.suggestion)
}

/// Defines the `guesstimate._core` Python module.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyGraph>()?;
    m.add_function(wrap_pyfunction!(extract_references, m)?)?;
    m.add_function(wrap_pyfunction!(resolve_params, m)?)?;
    Ok(())
}
