use crate::compute::{MetricOutcome, PlannedKind, SimulationPlan, SimulationResult, SkipReason};
use crate::graph::NodeId;
use crate::store::MetricId;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the dependency tree of `target` with each metric's formula and
/// outcome. Metrics already printed are shown as a back-reference.
pub fn format_trace(plan: &SimulationPlan, result: &SimulationResult, target: &MetricId) -> String {
    let mut tracer = Tracer { plan, result, visited_at_level: HashMap::new(), output: String::new() };

    match plan.node(target) {
        Some(node) => {
            let _ = writeln!(tracer.output, "AUDIT TRACE for metric '{}':", plan.metric(node).readable_id);
            let _ = writeln!(tracer.output, "--------------------------------------------------");
            tracer.trace_node(node, 1, "");
        }
        None => {
            let _ = writeln!(tracer.output, "Error: Unknown metric {}", target);
        }
    }
    tracer.output
}

struct Tracer<'a> {
    plan: &'a SimulationPlan,
    result: &'a SimulationResult,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, node_id: NodeId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&node_id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(node_id, level);

        let metric = self.plan.metric(node_id);
        let line_header = format!("[L{}] {}{}", level, metric.readable_id, self.format_value(&metric.id));

        match (&metric.kind, &metric.formula) {
            (PlannedKind::Prior(values), _) => {
                let _ = writeln!(self.output, "{}{} -> Data(len={})", prefix, line_header, values.len());
            }
            (_, Some(formula)) => {
                let _ = writeln!(self.output, "{}{} = {}", prefix, line_header, formula);
            }
            (_, None) => {
                let _ = writeln!(self.output, "{}{} -> Input", prefix, line_header);
            }
        }
        self.recurse_children(prefix, &metric.dependencies, level);
    }

    fn recurse_children(&mut self, prefix: &str, children: &[NodeId], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            self.trace_node(child, level + 1, &format!("{}{}", stem, connector));
        }
    }

    fn format_value(&self, id: &MetricId) -> String {
        match self.result.get(id) {
            Some(MetricOutcome::Evaluated { samples }) => match samples.summary() {
                Some(s) if s.stdev == 0.0 || s.count == 1 => format!(" [{:.3}]", s.mean),
                Some(s) => format!(" [mean {:.3}, 90% {:.3} to {:.3}]", s.mean, s.p5, s.p95),
                None => {
                    let truthy = samples.values().iter().filter(|v| v.as_bool().unwrap_or(false)).count();
                    format!(" [{}/{} true]", truthy, samples.len())
                }
            },
            Some(MetricOutcome::Errored { error }) => format!(" [Err: {}]", error),
            Some(MetricOutcome::Skipped { reason: SkipReason::NoFormula }) => " [no data]".to_string(),
            Some(MetricOutcome::Skipped { reason: SkipReason::MissingInput { metric } }) => {
                format!(" [waiting on {}]", metric)
            }
            None => " [?]".to_string(),
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
