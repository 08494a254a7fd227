//! plan.rs
//! Compiles a denormalized graph into an executable plan: resolved formulas,
//! the derived dependency graph, and a layered evaluation order.
//!
//! Everything that can fail for a single metric before sampling (parse,
//! reference resolution, cycles) is decided here and recorded on that metric
//! as `PlannedKind::Failed`.

use super::error::{MetricError, MetricErrorKind, SimulationError};
use crate::analysis::topology::{self, Layering};
use crate::formula::{parse_formula, Expr, ParseError, Property, RefName, Slot};
use crate::graph::{DependencyGraph, NodeId};
use crate::reference::{extract_references, scan};
use crate::store::{DenormalizedGraph, DenormalizedMetric, MetricId};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Which part of the graph a run evaluates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    All,
    /// The metric and its dependency closure.
    Metric(MetricId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannedKind {
    Formula(Expr<Slot>),
    /// No formula; reuse the values of a previous simulation.
    Prior(Arc<[f64]>),
    NoFormula,
    Failed(MetricError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMetric {
    pub id: MetricId,
    pub readable_id: String,
    pub formula: Option<String>,
    /// Resolved references, in order of first appearance. `Slot::index`
    /// points into this list.
    pub dependencies: SmallVec<[NodeId; 4]>,
    pub kind: PlannedKind,
}

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub metrics: Vec<PlannedMetric>,
    pub graph: DependencyGraph,
    pub layering: Layering,
    /// `active[i]` is true when node `i` belongs to the target's closure.
    pub active: Vec<bool>,
    index_by_id: HashMap<MetricId, NodeId>,
}

impl SimulationPlan {
    pub fn build(source: &DenormalizedGraph, target: &Target) -> Result<Self, SimulationError> {
        let mut index_by_id = HashMap::with_capacity(source.metrics.len());
        let mut by_readable: HashMap<&str, SmallVec<[NodeId; 1]>> = HashMap::new();
        for (i, m) in source.metrics.iter().enumerate() {
            if index_by_id.insert(m.id.clone(), NodeId::new(i)).is_some() {
                return Err(SimulationError::DuplicateMetricId(m.id.clone()));
            }
            by_readable.entry(m.readable_id.as_str()).or_default().push(NodeId::new(i));
        }

        // 1. Resolve references into edges and formulas into slot trees.
        let mut metrics: Vec<PlannedMetric> =
            source.metrics.iter().map(|m| plan_metric(m, &by_readable, source)).collect();

        let graph = DependencyGraph::from_parents(&metrics.iter().map(|m| m.dependencies.clone()).collect::<Vec<_>>());

        // 2. Restrict to the target's closure.
        let active = match target {
            Target::All => vec![true; graph.count()],
            Target::Metric(id) => {
                let node = *index_by_id.get(id).ok_or_else(|| SimulationError::UnknownTarget(id.clone()))?;
                let closure = topology::upstream_from(&graph, &[node]);
                graph.nodes().map(|n| closure.contains(&n)).collect()
            }
        };

        // 3. Layer; whatever cannot be layered sits on or behind a cycle.
        let layering = topology::layer(&graph, &active);
        if !layering.blocked.is_empty() {
            mark_circular(&mut metrics, &graph, &layering.blocked);
        }

        Ok(Self { metrics, graph, layering, active, index_by_id })
    }

    pub fn node(&self, id: &MetricId) -> Option<NodeId> {
        self.index_by_id.get(id).copied()
    }

    pub fn metric(&self, node: NodeId) -> &PlannedMetric {
        &self.metrics[node.index()]
    }
}

fn plan_metric(
    metric: &DenormalizedMetric,
    by_readable: &HashMap<&str, SmallVec<[NodeId; 1]>>,
    source: &DenormalizedGraph,
) -> PlannedMetric {
    let mut planned = PlannedMetric {
        id: metric.id.clone(),
        readable_id: metric.readable_id.clone(),
        formula: metric.formula().map(str::to_string),
        dependencies: SmallVec::new(),
        kind: PlannedKind::NoFormula,
    };

    let Some(text) = metric.formula() else {
        if let Some(values) = metric.prior_values() {
            planned.kind = PlannedKind::Prior(Arc::from(values));
        }
        return planned;
    };

    let mut failure = None;
    let mut slot_names: SmallVec<[&str; 4]> = SmallVec::new();
    for ident in extract_references(text) {
        match by_readable.get(ident.as_str()).map(|c| c.as_slice()) {
            Some([node]) => {
                planned.dependencies.push(*node);
                slot_names.push(source.metrics[node.index()].readable_id.as_str());
            }
            Some(candidates) if candidates.len() > 1 => {
                failure.get_or_insert_with(|| {
                    let ids = candidates.iter().map(|n| source.metrics[n.index()].id.clone()).collect();
                    MetricError::new(
                        MetricErrorKind::AmbiguousReference,
                        format!("'@{ident}' matches {} metrics", candidates.len()),
                        ids,
                    )
                });
            }
            _ => {
                failure.get_or_insert_with(|| {
                    MetricError::new(
                        MetricErrorKind::UnknownReference,
                        format!("no metric is named '@{ident}'"),
                        vec![metric.id.clone()],
                    )
                });
            }
        }
    }

    planned.kind = match failure {
        Some(error) => PlannedKind::Failed(error),
        None => match compile(metric, text, &slot_names) {
            Ok(expr) => PlannedKind::Formula(expr),
            Err(error) => PlannedKind::Failed(error),
        },
    };
    planned
}

fn compile(metric: &DenormalizedMetric, text: &str, slot_names: &[&str]) -> Result<Expr<Slot>, MetricError> {
    let parse_error = |e: ParseError| MetricError::new(MetricErrorKind::Parse, e.to_string(), vec![metric.id.clone()]);

    let parsed = match parse_formula(text) {
        Ok(expr) => expr,
        Err(original) => {
            // A dangling marker or accessor dot (usually mid-edit) truncates the formula.
            let offset = scan(text).malformed_at.ok_or_else(|| parse_error(original.clone()))?;
            let expr = parse_formula(&text[..offset]).map_err(|_| parse_error(original))?;
            warn!(metric = %metric.id, offset, "evaluating formula prefix before malformed reference");
            expr
        }
    };

    parsed.try_map_refs(&mut |r: RefName| {
        let index = slot_names.iter().position(|n| *n == r.ident).ok_or_else(|| {
            MetricError::new(
                MetricErrorKind::UnknownReference,
                format!("no metric is named '@{}'", r.ident),
                vec![metric.id.clone()],
            )
        })?;
        let property = resolve_property(&r).map_err(parse_error)?;
        Ok(Slot { index, property })
    })
}

fn resolve_property(r: &RefName) -> Result<Option<Property>, ParseError> {
    match r.properties.as_slice() {
        [] => Ok(None),
        [name] => Property::from_name(name)
            .map(Some)
            .ok_or_else(|| ParseError::UnknownProperty { name: name.clone() }),
        _ => Err(ParseError::TooManyProperties { reference: r.ident.clone() }),
    }
}

/// Marks every blocked node as circular, unless it already failed on its own.
/// The offending ids are the cycle members upstream of the node.
fn mark_circular(metrics: &mut [PlannedMetric], graph: &DependencyGraph, blocked: &[NodeId]) {
    let mut offenders: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for group in topology::cycles(graph) {
        for node in topology::downstream_from(graph, &group) {
            offenders.entry(node).or_default().extend(group.iter().copied());
        }
    }

    for &node in blocked {
        let mut members = offenders.remove(&node).unwrap_or_default();
        members.sort_unstable();
        members.dedup();
        let ids: Vec<MetricId> = members.iter().map(|n| metrics[n.index()].id.clone()).collect();

        let planned = &mut metrics[node.index()];
        if matches!(planned.kind, PlannedKind::Failed(_)) {
            continue;
        }
        let message = if members.contains(&node) {
            format!("'{}' is part of a reference cycle", planned.readable_id)
        } else {
            format!("'{}' depends on a reference cycle", planned.readable_id)
        };
        planned.kind = PlannedKind::Failed(MetricError::new(MetricErrorKind::CircularDependency, message, ids));
    }
}
