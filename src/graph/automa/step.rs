//! One scheduler step: launch, await, integrate topology changes, post-task
//! accounting, re-validate, apply a pending output-worker change, collect
//! interactions, and compute the next wavefront.
//!
//! Runs as a child module of `automa` so it can reach `Inner`'s private
//! fields directly — privacy in Rust follows module-tree position, not file
//! layout, and a descendant module sees everything its ancestors can.

use super::{apply_topology_change, compute_mapped_args, GraphAutoma};
use crate::errors::AutomaError;
use crate::graph::record::GraphWorker;
use crate::graph::state::KickoffInfo;
use crate::interaction::Interaction;
use crate::types::{LastKickoff, WorkerKey};
use crate::value::WorkerArgs;
use crate::worker::WorkerContext;
use futures_util::future::join_all;
use std::sync::Arc;

struct Launch {
    worker_key: WorkerKey,
    record: GraphWorker,
    args: WorkerArgs,
    is_automa: bool,
}

pub async fn run_step(automa: &GraphAutoma) -> Result<(), AutomaError> {
    // Skip already-finished kickoffs left over from a resumed run, then
    // compute args and assemble the launch list in `current_kickoff` order.
    let launches = prepare_launches(automa)?;

    // Await every launched task; cooperative suspension (interaction, I/O)
    // is just another `.await` point inside `worker.run`.
    let ctx_scheduler: Arc<dyn crate::worker::SchedulerAccess> = Arc::new(automa.clone());
    let results = join_all(launches.into_iter().map(|launch| {
        let ctx = WorkerContext::new(launch.worker_key.clone(), ctx_scheduler.clone());
        async move {
            let result = launch.record.run(launch.args, ctx).await;
            (launch.worker_key, launch.is_automa, result)
        }
    }))
    .await;

    // Integrate deferred topology changes before post-task accounting
    // reads `workers`/`forwards`/`dynamic_triggers`.
    let topology_changed = {
        let mut guard = automa.with_inner(|i| std::mem::take(&mut i.topology_deferred));
        let changed = !topology_changed_is_empty(&topology_changed);
        automa.with_inner(|inner| {
            for change in topology_changed.drain(..) {
                apply_topology_change(&mut inner.state, change);
            }
        });
        changed
    };

    // Post-task accounting.
    let mut finished_this_step: Vec<WorkerKey> = Vec::new();
    let mut collected_interactions: Vec<Interaction> = Vec::new();
    let mut hard_error: Option<AutomaError> = None;

    automa.with_inner(|inner| {
        for (key, is_automa, result) in results {
            match result {
                Ok(value) => {
                    mark_kickoff_finished(&mut inner.state.current_kickoff, &key);
                    if inner.state.workers.contains_key(&key) {
                        inner.state.output_buffer.insert(key.clone(), value);
                        if let Some(record) = inner.state.workers.get(&key) {
                            let deps: indexmap::IndexSet<WorkerKey> =
                                record.dependencies.iter().cloned().collect();
                            inner.state.dynamic_triggers.insert(key.clone(), deps);
                        }
                        if let Some(successors) = inner.state.forwards.get(&key).cloned() {
                            for s in successors {
                                if let Some(triggers) = inner.state.dynamic_triggers.get_mut(&s) {
                                    triggers.shift_remove(&key);
                                }
                            }
                        }
                        inner.state.worker_interaction_indices.remove(&key);
                        inner.state.ongoing_interactions.shift_remove(&key);
                    }
                    finished_this_step.push(key);
                }
                Err(crate::errors::WorkerError::Interact(ints)) => {
                    // Storage into `ongoing_interactions` already happened
                    // at the point of origin (inside `interact_with_human`,
                    // on whichever GraphAutoma instance owns that worker) —
                    // nested automata therefore never get double-booked
                    // here.
                    let _ = is_automa;
                    collected_interactions.extend(ints);
                }
                Err(other) => {
                    hard_error = Some(AutomaError::WorkerFailed {
                        key,
                        source: Box::new(other),
                    });
                }
            }
        }
    });

    if let Some(err) = hard_error {
        return Err(err);
    }

    // Re-validate if topology changed.
    if topology_changed {
        automa.with_inner(|inner| {
            crate::graph::validate::validate_all(
                &inner.state.workers,
                inner.state.output_worker_key.as_ref(),
            )
        })?;
    }

    // Apply a pending output-worker change.
    automa.with_inner(|inner| {
        if let Some(key) = inner.set_output_deferred.take() {
            inner.state.output_worker_key = Some(key);
        }
    });

    // Collect interaction exceptions.
    if !collected_interactions.is_empty() {
        return if automa.is_root() {
            let snapshot = automa.to_snapshot();
            Err(AutomaError::Interaction(
                crate::interaction::InteractionException {
                    interactions: collected_interactions,
                    snapshot,
                },
            ))
        } else {
            Err(AutomaError::BubbledInteraction(collected_interactions))
        };
    }

    // Compute the next wavefront.
    automa.with_inner(|inner| {
        let ferries = std::mem::take(&mut inner.ferry_deferred);
        let mut next: Vec<KickoffInfo> = Vec::new();
        let mut seen: indexmap::IndexSet<WorkerKey> = indexmap::IndexSet::new();

        for (key, args) in ferries {
            if seen.insert(key.clone()) {
                next.push(KickoffInfo::ferry(key, args));
            }
        }

        for finished in &finished_this_step {
            let Some(successors) = inner.state.forwards.get(finished).cloned() else {
                continue;
            };
            for s in successors {
                if seen.contains(&s) {
                    continue;
                }
                let empty_triggers = inner
                    .state
                    .dynamic_triggers
                    .get(&s)
                    .map(|t| t.is_empty())
                    .unwrap_or(false);
                if empty_triggers {
                    seen.insert(s.clone());
                    next.push(KickoffInfo::from_dependency(s, finished.clone()));
                }
            }
        }

        inner.state.current_kickoff = next;
    });

    // Clear remaining transient queues (ferry/topology/output-change were
    // already drained above; this covers any left empty by design).
    Ok(())
}

fn topology_changed_is_empty(changes: &[crate::graph::state::TopologyChange]) -> bool {
    changes.is_empty()
}

fn mark_kickoff_finished(kickoff: &mut [KickoffInfo], key: &WorkerKey) {
    for entry in kickoff.iter_mut() {
        if entry.worker_key == *key {
            entry.run_finished = true;
        }
    }
}

fn prepare_launches(automa: &GraphAutoma) -> Result<Vec<Launch>, AutomaError> {
    automa.with_inner(|inner| {
        let pending: Vec<KickoffInfo> = inner
            .state
            .current_kickoff
            .iter()
            .filter(|k| !k.run_finished)
            .cloned()
            .collect();

        let mut launches = Vec::with_capacity(pending.len());
        for kickoff in pending {
            let Some(record) = inner.state.workers.get(&kickoff.worker_key) else {
                continue; // removed between enqueue and launch: silently skipped
            };

            // Interaction index resets at launch, not only on success: a
            // worker re-launched after a suspension replays its body from
            // the top and must see the same 0-based sequence of
            // interact_with_human calls it saw before suspending.
            inner
                .state
                .worker_interaction_indices
                .insert(kickoff.worker_key.clone(), 0);

            let args = match &kickoff.baked_args {
                Some(args) => args.clone(),
                None => {
                    let last_output = match &kickoff.last_kickoff {
                        LastKickoff::Worker(k) => inner.state.output_buffer.get(k),
                        LastKickoff::Automa => None,
                    };
                    compute_mapped_args(&inner.state, record, last_output)?
                }
            };

            launches.push(Launch {
                worker_key: kickoff.worker_key.clone(),
                is_automa: record.is_automa(),
                record: record.clone(),
                args,
            });
        }
        Ok(launches)
    })
}
