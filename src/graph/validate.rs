//! Structural invariant checks and DAG validation.
//!
//! The cycle check uses an in-degree/Kahn approach rather than a DFS
//! coloring scheme, so a detected cycle reports exactly the
//! still-unvisited (and therefore cyclic) worker keys.

use crate::errors::CompilationError;
use crate::graph::record::GraphWorker;
use crate::types::WorkerKey;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Every dependency names a registered worker.
pub fn check_no_dangling_dependencies(
    workers: &IndexMap<WorkerKey, GraphWorker>,
) -> Result<(), CompilationError> {
    for record in workers.values() {
        for dep in &record.dependencies {
            if !workers.contains_key(dep) {
                return Err(CompilationError::DanglingDependency {
                    key: record.key.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// If set, `output_worker_key` names a registered worker.
pub fn check_output_worker(
    workers: &IndexMap<WorkerKey, GraphWorker>,
    output_worker_key: Option<&WorkerKey>,
) -> Result<(), CompilationError> {
    if let Some(key) = output_worker_key {
        if !workers.contains_key(key) {
            return Err(CompilationError::MissingOutputWorker { key: key.clone() });
        }
    }
    Ok(())
}

/// The `dependencies` graph is acyclic. Kahn's algorithm: repeatedly
/// remove zero-in-degree nodes; anything left unvisited is on a cycle.
pub fn check_acyclic(workers: &IndexMap<WorkerKey, GraphWorker>) -> Result<(), CompilationError> {
    let mut in_degree: FxHashMap<WorkerKey, usize> =
        workers.keys().map(|k| (k.clone(), 0usize)).collect();
    for record in workers.values() {
        for dep in &record.dependencies {
            // edge dep -> key
            if let Some(count) = in_degree.get_mut(&record.key) {
                *count += 1;
            }
            let _ = dep; // dependency existence already checked above
        }
    }

    let mut queue: Vec<WorkerKey> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(k, _)| k.clone())
        .collect();
    queue.sort();

    let mut visited: FxHashMap<WorkerKey, bool> =
        workers.keys().map(|k| (k.clone(), false)).collect();
    let mut visited_count = 0usize;

    while let Some(key) = queue.pop() {
        if visited[&key] {
            continue;
        }
        visited.insert(key.clone(), true);
        visited_count += 1;
        if let Some(record) = workers.get(&key) {
            let _ = record;
        }
        for (successor, record) in workers.iter() {
            if record.dependencies.contains(&key) {
                if let Some(count) = in_degree.get_mut(successor) {
                    *count -= 1;
                    if *count == 0 && !visited[successor] {
                        queue.push(successor.clone());
                    }
                }
            }
        }
    }

    if visited_count != workers.len() {
        let cyclic: Vec<WorkerKey> = visited
            .iter()
            .filter(|(_, &done)| !done)
            .map(|(k, _)| k.clone())
            .collect();
        return Err(CompilationError::Cycle { cyclic });
    }
    Ok(())
}

pub fn validate_all(
    workers: &IndexMap<WorkerKey, GraphWorker>,
    output_worker_key: Option<&WorkerKey>,
) -> Result<(), CompilationError> {
    check_no_dangling_dependencies(workers)?;
    check_output_worker(workers, output_worker_key)?;
    check_acyclic(workers)?;
    Ok(())
}

/// Optional `petgraph`-backed companions to the hand-rolled Kahn's-algorithm
/// check above: a topological sort restated on top of a real graph crate
/// (useful for hosts that want petgraph's own algorithms on the same
/// topology), and `.dot` export for visualizing a `GraphAutoma`'s current
/// wiring. Neither replaces `check_acyclic`, which stays the always-on
/// validation path so the crate's cycle diagnostics don't depend on an
/// optional feature.
#[cfg(feature = "petgraph-compat")]
pub mod petgraph_compat {
    use super::*;
    use petgraph::algo::toposort;
    use petgraph::graph::{DiGraph, NodeIndex};

    /// Builds a `petgraph::DiGraph` with one node per worker and one edge
    /// per `dependency -> key` relationship, alongside the key-to-index
    /// lookup needed to map results back.
    pub fn to_petgraph(
        workers: &IndexMap<WorkerKey, GraphWorker>,
    ) -> (DiGraph<WorkerKey, ()>, FxHashMap<WorkerKey, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices = FxHashMap::default();
        for key in workers.keys() {
            indices.insert(key.clone(), graph.add_node(key.clone()));
        }
        for record in workers.values() {
            for dep in &record.dependencies {
                if let (Some(&from), Some(&to)) = (indices.get(dep), indices.get(&record.key)) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        (graph, indices)
    }

    /// A topological ordering of worker keys, or the cyclic keys `toposort`
    /// could not place if the topology has a cycle.
    pub fn topological_order(
        workers: &IndexMap<WorkerKey, GraphWorker>,
    ) -> Result<Vec<WorkerKey>, CompilationError> {
        let (graph, _) = to_petgraph(workers);
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|idx| graph[idx].clone()).collect())
            .map_err(|cycle| CompilationError::Cycle {
                cyclic: vec![graph[cycle.node_id()].clone()],
            })
    }

    /// Renders the current topology as Graphviz `.dot` source.
    pub fn to_dot(workers: &IndexMap<WorkerKey, GraphWorker>) -> String {
        let (graph, _) = to_petgraph(workers);
        format!("{}", petgraph::dot::Dot::with_config(&graph, &[]))
    }
}
