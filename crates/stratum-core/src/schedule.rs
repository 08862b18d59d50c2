//! Dependency scheduler: combines explicit `depends_on` edges with implicit
//! edges derived from `$.steps.<id>` references, then runs Kahn's algorithm
//! to produce a deterministic topological order.
//!
//! Pure and side-effect-free by design (see the controller spec's "Scheduler
//! purity" note): no IO, no globals, callers construct `FlowDef` values
//! directly to test ordering properties without parsing a spec.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ExecutionError;
use crate::ir::FlowDef;
use crate::resolve::referenced_step_id;

/// Compute the deterministic dispatch order for `flow`, or report the set of
/// steps involved in a dependency cycle.
///
/// Ties among simultaneously-ready nodes are broken by original step-list
/// order, so the result is a stable, deterministic permutation of
/// `flow.steps` whenever no cycle exists.
pub fn order(flow: &FlowDef) -> Result<Vec<String>, ExecutionError> {
    let index_of: HashMap<&str, usize> = flow
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    // dependents[d] = steps that depend on d (edge d -> s)
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indegree: HashMap<&str, usize> = flow.steps.iter().map(|s| (s.id.as_str(), 0)).collect();

    let mut add_edge = |from: &str, to: &str| {
        if from == to {
            return;
        }
        if let (Some(_), Some(_)) = (index_of.get(from), index_of.get(to)) {
            let entry = dependents.entry(from).or_default();
            if !entry.contains(&to) {
                entry.push(to);
                *indegree.get_mut(to).unwrap() += 1;
            }
        }
    };

    for step in &flow.steps {
        for dep in &step.depends_on {
            add_edge(dep.as_str(), step.id.as_str());
        }
        for binding in step.inputs.values() {
            if let Some(dep_id) = referenced_step_id(binding) {
                add_edge(dep_id, step.id.as_str());
            }
        }
    }

    // Ready set ordered by original step-list position for determinism.
    let mut ready: VecDeque<&str> = flow
        .steps
        .iter()
        .filter(|s| indegree[s.id.as_str()] == 0)
        .map(|s| s.id.as_str())
        .collect();

    let mut ordered: Vec<String> = Vec::with_capacity(flow.steps.len());
    let mut scheduled: HashSet<&str> = HashSet::new();

    while let Some(node) = pop_lowest_index(&mut ready, &index_of) {
        ordered.push(node.to_string());
        scheduled.insert(node);

        if let Some(children) = dependents.get(node) {
            for &child in children {
                let degree = indegree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(child);
                }
            }
        }
    }

    if ordered.len() < flow.steps.len() {
        let unresolved: Vec<String> = flow
            .steps
            .iter()
            .map(|s| s.id.as_str())
            .filter(|id| !scheduled.contains(id))
            .map(|s| s.to_string())
            .collect();
        return Err(ExecutionError::Cycle { steps: unresolved });
    }

    Ok(ordered)
}

/// Pop the ready node with the lowest original step-list index, to keep
/// dispatch order deterministic regardless of edge-discovery order.
fn pop_lowest_index<'a>(
    ready: &mut VecDeque<&'a str>,
    index_of: &HashMap<&str, usize>,
) -> Option<&'a str> {
    if ready.is_empty() {
        return None;
    }
    let (pos, _) = ready
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| index_of[*id])?;
    ready.remove(pos)
}
