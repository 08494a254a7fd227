//! engine.rs
//! Level-by-level Monte Carlo execution of a [`SimulationPlan`].

use super::error::{MetricError, MetricErrorKind, SimulationError};
use super::ledger::{Ledger, MetricOutcome, SampleSet, SkipReason};
use super::plan::{PlannedKind, PlannedMetric, SimulationPlan, Target};
use super::result::SimulationResult;
use crate::config::SimulationConfig;
use crate::formula::{DependencyView, EvalError, Evaluator, Expr, SampleContext, SampleRng, Slot, StandardEvaluator, Value};
use crate::graph::NodeId;
use crate::store::DenormalizedGraph;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cooperative cancellation flag, checked between evaluation levels.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Simulator<E: Evaluator = StandardEvaluator> {
    config: SimulationConfig,
    evaluator: E,
    cancel: Option<CancellationToken>,
}

impl Simulator<StandardEvaluator> {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_evaluator(config, StandardEvaluator)
    }
}

impl<E: Evaluator> Simulator<E> {
    pub fn with_evaluator(config: SimulationConfig, evaluator: E) -> Self {
        Self { config, evaluator, cancel: None }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Plans and executes a run over `graph`.
    ///
    /// Only request-level problems are returned as `Err`; failures of
    /// individual metrics are reported inside the result.
    pub fn run(&self, graph: &DenormalizedGraph, target: &Target, sample_count: usize) -> Result<SimulationResult, SimulationError> {
        self.config.check_sample_count(sample_count)?;
        let plan = SimulationPlan::build(graph, target)?;
        self.execute(&plan, sample_count)
    }

    pub fn execute(&self, plan: &SimulationPlan, n: usize) -> Result<SimulationResult, SimulationError> {
        self.config.check_sample_count(n)?;
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let base_rng = SampleRng::seed_from_u64(seed);
        let mut ledger = Ledger::with_capacity(plan.metrics.len());

        info!(
            metrics = plan.active.iter().filter(|a| **a).count(),
            levels = plan.layering.levels.len(),
            samples = n,
            seed,
            "starting simulation"
        );

        // 1. Cycle casualties never get scheduled.
        for &node in &plan.layering.blocked {
            ledger.insert(node, resolve_failed(plan.metric(node)));
        }

        // 2. Levels in order; metrics within a level are independent.
        for (depth, level) in plan.layering.levels.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!(depth, "simulation cancelled");
                return Err(SimulationError::Cancelled);
            }
            debug!(depth, width = level.len(), "evaluating level");

            let outcomes: Vec<(NodeId, MetricOutcome)> = level
                .par_iter()
                .map(|&node| (node, self.evaluate_metric(plan, node, &ledger, n, &base_rng)))
                .collect();
            for (node, outcome) in outcomes {
                ledger.insert(node, outcome);
            }
        }

        // 3. Assemble in report order.
        let mut entries = Vec::new();
        let mut errored = 0usize;
        for node in plan.layering.order().chain(plan.layering.blocked.iter().copied()) {
            if let Some(outcome) = ledger.take(node) {
                errored += usize::from(outcome.is_errored());
                entries.push((plan.metric(node).id.clone(), outcome));
            }
        }
        info!(reported = entries.len(), errored, "simulation finished");
        Ok(SimulationResult::new(n, seed, entries))
    }

    fn evaluate_metric(&self, plan: &SimulationPlan, node: NodeId, ledger: &Ledger, n: usize, base_rng: &SampleRng) -> MetricOutcome {
        let metric = plan.metric(node);

        if let PlannedKind::Failed(_) = metric.kind {
            return resolve_failed(metric);
        }
        if let Some(outcome) = upstream_outcome(plan, metric, ledger) {
            return outcome;
        }
        let expr = match &metric.kind {
            PlannedKind::Formula(expr) => expr,
            PlannedKind::Prior(values) => {
                return MetricOutcome::Evaluated {
                    samples: SampleSet::from_numbers((0..n).map(|i| values[i % values.len()])),
                }
            }
            PlannedKind::NoFormula | PlannedKind::Failed(_) => {
                return MetricOutcome::Skipped { reason: SkipReason::NoFormula }
            }
        };

        let mut views = Vec::with_capacity(metric.dependencies.len());
        for &dep in &metric.dependencies {
            match ledger.get(dep).and_then(MetricOutcome::samples) {
                Some(samples) => views.push(samples.view()),
                None => return MetricOutcome::Skipped { reason: SkipReason::MissingInput { metric: plan.metric(dep).id.clone() } },
            }
        }

        match self.sample(expr, &views, node, n, base_rng) {
            Ok(values) => MetricOutcome::Evaluated { samples: SampleSet::new(values) },
            Err((index, e)) => {
                let error = MetricError::new(MetricErrorKind::Evaluation, format!("sample {index}: {e}"), vec![metric.id.clone()]);
                warn!(metric = %metric.id, %error, "metric failed");
                MetricOutcome::Errored { error }
            }
        }
    }

    /// Draws all N samples. On failure, reports the lowest failing index.
    fn sample(
        &self,
        expr: &Expr<Slot>,
        views: &[DependencyView<'_>],
        node: NodeId,
        n: usize,
        base_rng: &SampleRng,
    ) -> Result<Vec<Value>, (usize, EvalError)> {
        let draw = |index: usize| {
            let ctx = SampleContext { index, dependencies: views };
            let mut rng = sample_stream(base_rng, node, index);
            self.evaluator.evaluate(expr, &ctx, &mut rng).map_err(|e| (index, e))
        };

        if n >= self.config.parallel_threshold {
            let drawn: Vec<Result<Value, (usize, EvalError)>> = (0..n).into_par_iter().map(draw).collect();
            drawn.into_iter().collect()
        } else {
            (0..n).map(draw).collect()
        }
    }
}

/// Independent stream for one (metric, sample) pair. Depends only on the
/// seed and the two indices, never on scheduling.
fn sample_stream(base: &SampleRng, node: NodeId, index: usize) -> SampleRng {
    let mut rng = base.clone();
    rng.set_stream(node.0 as u64);
    rng.set_word_pos((index as u128) << 32);
    rng
}

fn resolve_failed(metric: &PlannedMetric) -> MetricOutcome {
    match &metric.kind {
        PlannedKind::Failed(error) => {
            warn!(metric = %metric.id, %error, "metric failed");
            MetricOutcome::Errored { error: error.clone() }
        }
        _ => MetricOutcome::Skipped { reason: SkipReason::NoFormula },
    }
}

/// The outcome forced on `metric` by its dependencies, if any. Errors win
/// over missing input; both name the metric where the problem started.
fn upstream_outcome(plan: &SimulationPlan, metric: &PlannedMetric, ledger: &Ledger) -> Option<MetricOutcome> {
    let mut missing = None;
    for &dep in &metric.dependencies {
        let dep_id = &plan.metric(dep).id;
        match ledger.get(dep) {
            Some(MetricOutcome::Errored { error }) => {
                let root = match error.kind {
                    MetricErrorKind::Upstream => error.offending.clone(),
                    _ => vec![dep_id.clone()],
                };
                let message = format!("depends on '{}', which failed", plan.metric(dep).readable_id);
                return Some(MetricOutcome::Errored { error: MetricError::new(MetricErrorKind::Upstream, message, root) });
            }
            Some(MetricOutcome::Skipped { reason }) if missing.is_none() => {
                let root = match reason {
                    SkipReason::MissingInput { metric } => metric.clone(),
                    SkipReason::NoFormula => dep_id.clone(),
                };
                missing = Some(root);
            }
            _ => {}
        }
    }
    missing.map(|metric| MetricOutcome::Skipped { reason: SkipReason::MissingInput { metric } })
}

/// Simulates `graph` once with the given configuration.
pub fn simulate(graph: &DenormalizedGraph, target: &Target, n: usize, config: SimulationConfig) -> Result<SimulationResult, SimulationError> {
    Simulator::new(config).run(graph, target, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Graph, Guesstimate, Metric, MetricId, Sample, Simulation};
    use rstest::rstest;

    fn graph(pairs: &[(&str, &str)]) -> Graph {
        let metrics = pairs.iter().map(|(r, _)| Metric::new(*r, *r)).collect();
        let guesstimates = pairs
            .iter()
            .filter(|(_, f)| !f.is_empty())
            .map(|(r, f)| Guesstimate::new(*r, *f))
            .collect();
        Graph::new(metrics, guesstimates)
    }

    fn seeded(seed: u64) -> Simulator {
        Simulator::new(SimulationConfig::default().with_seed(seed))
    }

    fn run(pairs: &[(&str, &str)], n: usize) -> SimulationResult {
        seeded(7).run(&graph(pairs).denormalize(), &Target::All, n).unwrap()
    }

    fn numbers(result: &SimulationResult, id: &str) -> Vec<f64> {
        result.samples(&MetricId::new(id)).and_then(SampleSet::numbers).unwrap()
    }

    fn kind(result: &SimulationResult, id: &str) -> Option<MetricErrorKind> {
        result.error(&MetricId::new(id)).map(|e| e.kind)
    }

    #[test]
    fn test_point_estimates_propagate() {
        let result = run(&[("A", "5"), ("B", "@A + 1")], 100);
        assert_eq!(numbers(&result, "A"), vec![5.0; 100]);
        assert_eq!(numbers(&result, "B"), vec![6.0; 100]);
        assert_eq!(result.order(), &[MetricId::new("A"), MetricId::new("B")]);
    }

    #[test]
    fn test_mutual_reference_is_circular() {
        let result = run(&[("A", "@B"), ("B", "@A"), ("C", "3")], 10);
        assert_eq!(kind(&result, "A"), Some(MetricErrorKind::CircularDependency));
        assert_eq!(kind(&result, "B"), Some(MetricErrorKind::CircularDependency));
        assert_eq!(numbers(&result, "C"), vec![3.0; 10]);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_unknown_reference_is_contained() {
        let result = run(&[("A", "@Z"), ("B", "2")], 4);
        assert_eq!(kind(&result, "A"), Some(MetricErrorKind::UnknownReference));
        assert_eq!(numbers(&result, "B"), vec![2.0; 4]);
    }

    #[test]
    fn test_acyclic_graph_never_errors() {
        let result = run(
            &[("A", "normal(10, 2)"), ("B", "1 to 3"), ("C", "@A * @B"), ("D", "max(@C, @A.p95)"), ("E", "uniform(0, 1) < 0.5")],
            500,
        );
        assert_eq!(result.errors().count(), 0);
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn test_identity_formula_preserves_index() {
        let result = run(&[("A", "normal(0, 1)"), ("B", "@A")], 200);
        assert_eq!(numbers(&result, "A"), numbers(&result, "B"));
    }

    #[test]
    fn test_correlated_samples_cancel() {
        let result = run(&[("A", "uniform(1, 2)"), ("B", "@A - @A")], 300);
        assert_eq!(numbers(&result, "B"), vec![0.0; 300]);
    }

    #[rstest]
    #[case(1)]
    #[case(2048)]
    fn test_seed_fixes_samples(#[case] n: usize) {
        let g = graph(&[("A", "normal(0, 1)"), ("B", "@A * lognormal(1, 10)")]).denormalize();
        let first = seeded(99).run(&g, &Target::All, n).unwrap();
        let second = seeded(99).run(&g, &Target::All, n).unwrap();
        assert_eq!(first, second);
        assert_eq!(numbers(&first, "B").len(), n);
        assert_eq!(first.seed, 99);
    }

    #[test]
    fn test_parallel_and_sequential_paths_agree() {
        let g = graph(&[("A", "normal(0, 1)"), ("B", "@A + triangular(0, 1, 3)")]).denormalize();
        let serial = SimulationConfig { parallel_threshold: usize::MAX, ..SimulationConfig::default().with_seed(5) };
        let parallel = SimulationConfig { parallel_threshold: 1, ..SimulationConfig::default().with_seed(5) };
        assert_eq!(
            Simulator::new(serial).run(&g, &Target::All, 300).unwrap(),
            Simulator::new(parallel).run(&g, &Target::All, 300).unwrap()
        );
    }

    #[test]
    fn test_target_matches_full_run() {
        let g = graph(&[("A", "normal(5, 1)"), ("B", "@A * 2"), ("C", "uniform(0, 1)"), ("D", "@C")]).denormalize();
        let full = seeded(3).run(&g, &Target::All, 64).unwrap();
        let partial = seeded(3).run(&g, &Target::Metric("B".into()), 64).unwrap();
        assert_eq!(partial.order(), &[MetricId::new("A"), MetricId::new("B")]);
        assert_eq!(partial.samples(&"B".into()), full.samples(&"B".into()));
        assert!(partial.get(&"C".into()).is_none());
    }

    #[test]
    fn test_evaluation_error_cascades_downstream_only() {
        let result = run(&[("A", "0"), ("B", "1 / @A"), ("C", "@B + 1"), ("D", "@C"), ("E", "@A + 1")], 5);
        assert_eq!(kind(&result, "B"), Some(MetricErrorKind::Evaluation));
        assert_eq!(kind(&result, "C"), Some(MetricErrorKind::Upstream));
        let d = result.error(&"D".into()).unwrap();
        assert_eq!(d.kind, MetricErrorKind::Upstream);
        assert_eq!(d.offending, vec![MetricId::new("B")]);
        assert_eq!(numbers(&result, "E"), vec![1.0; 5]);
    }

    #[test]
    fn test_single_bad_index_fails_whole_metric() {
        let result = run(&[("A", "1, 0"), ("B", "1 / @A")], 50);
        let err = result.error(&"B".into()).unwrap();
        assert_eq!(err.kind, MetricErrorKind::Evaluation);
        assert!(err.message.contains("division by zero"));
    }

    #[test]
    fn test_inputs_without_data_are_skipped() {
        let result = run(&[("A", ""), ("B", "@A + 1"), ("C", "@B")], 3);
        assert_eq!(result.get(&"A".into()), Some(&MetricOutcome::Skipped { reason: SkipReason::NoFormula }));
        let missing_a = MetricOutcome::Skipped { reason: SkipReason::MissingInput { metric: "A".into() } };
        assert_eq!(result.get(&"B".into()), Some(&missing_a));
        assert_eq!(result.get(&"C".into()), Some(&missing_a));
    }

    #[test]
    fn test_prior_values_are_cycled() {
        let mut g = graph(&[("A", ""), ("B", "@A * 10")]);
        g.simulations.push(Simulation { metric: "A".into(), sample: Sample { values: vec![1.0, 2.0, 3.0], errors: vec![] } });
        let result = seeded(1).run(&g.denormalize(), &Target::All, 5).unwrap();
        assert_eq!(numbers(&result, "A"), vec![1.0, 2.0, 3.0, 1.0, 2.0]);
        assert_eq!(numbers(&result, "B"), vec![10.0, 20.0, 30.0, 10.0, 20.0]);
    }

    #[rstest]
    #[case(0, SimulationError::InvalidSampleCount { requested: 0 })]
    #[case(2_000_000, SimulationError::SampleCountTooLarge { requested: 2_000_000, max: 1_000_000 })]
    fn test_sample_count_rejected(#[case] n: usize, #[case] expected: SimulationError) {
        let g = graph(&[("A", "1")]).denormalize();
        assert_eq!(seeded(1).run(&g, &Target::All, n).unwrap_err(), expected);
    }

    #[test]
    fn test_single_sample() {
        assert_eq!(numbers(&run(&[("A", "normal(0, 1)")], 1), "A").len(), 1);
    }

    #[test]
    fn test_cancelled_run_returns_error() {
        let token = CancellationToken::new();
        let sim = seeded(1).with_cancellation(token.clone());
        token.cancel();
        let g = graph(&[("A", "1")]).denormalize();
        assert_eq!(sim.run(&g, &Target::All, 10).unwrap_err(), SimulationError::Cancelled);
    }

    struct Constant(f64);

    impl Evaluator for Constant {
        fn evaluate(&self, _: &Expr<Slot>, _: &SampleContext<'_>, _: &mut SampleRng) -> Result<Value, EvalError> {
            Ok(Value::Number(self.0))
        }
    }

    #[test]
    fn test_custom_evaluator() {
        let g = graph(&[("A", "normal(0, 1)")]).denormalize();
        let result = Simulator::with_evaluator(SimulationConfig::default(), Constant(4.0)).run(&g, &Target::All, 3).unwrap();
        assert_eq!(numbers(&result, "A"), vec![4.0; 3]);
    }

    /// Cancels its token the first time it evaluates anything.
    struct CancelOnFirstSample(CancellationToken);

    impl Evaluator for CancelOnFirstSample {
        fn evaluate(&self, _: &Expr<Slot>, _: &SampleContext<'_>, _: &mut SampleRng) -> Result<Value, EvalError> {
            self.0.cancel();
            Ok(Value::Number(1.0))
        }
    }

    #[test]
    fn test_cancel_during_level_stops_next_level() {
        let token = CancellationToken::new();
        let sim = Simulator::with_evaluator(SimulationConfig::default().with_seed(3), CancelOnFirstSample(token.clone()))
            .with_cancellation(token.clone());
        let g = graph(&[("A", "1"), ("B", "@A")]).denormalize();
        assert!(!token.is_cancelled());
        assert_eq!(sim.run(&g, &Target::All, 4).unwrap_err(), SimulationError::Cancelled);
        assert!(token.is_cancelled());
    }
}
