//! GraphAutoma state split into persistent (round-trips through a snapshot)
//! and transient (rebuilt fresh on every process) halves.

use crate::graph::record::GraphWorker;
use crate::interaction::InteractionAndFeedback;
use crate::types::{ArgsMappingRule, LastKickoff, WorkerKey};
use crate::value::WorkerArgs;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entry in a step's launch list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickoffInfo {
    pub worker_key: WorkerKey,
    pub last_kickoff: LastKickoff,
    pub from_ferry: bool,
    pub run_finished: bool,
    /// `Some` for ferry- and top-level-sourced kickoffs, whose args are
    /// fixed at enqueue time and bypass argument mapping entirely.
    /// `None` for dependency-driven kickoffs, whose args are computed at
    /// launch time from the then-current output buffer.
    pub baked_args: Option<WorkerArgs>,
}

impl KickoffInfo {
    pub fn top_level(worker_key: WorkerKey, args: WorkerArgs) -> Self {
        Self {
            worker_key,
            last_kickoff: LastKickoff::Automa,
            from_ferry: false,
            run_finished: false,
            baked_args: Some(args),
        }
    }

    pub fn from_dependency(worker_key: WorkerKey, finished: WorkerKey) -> Self {
        Self {
            worker_key,
            last_kickoff: LastKickoff::Worker(finished),
            from_ferry: false,
            run_finished: false,
            baked_args: None,
        }
    }

    pub fn ferry(worker_key: WorkerKey, args: WorkerArgs) -> Self {
        Self {
            worker_key,
            last_kickoff: LastKickoff::Automa,
            from_ferry: true,
            run_finished: false,
            baked_args: Some(args),
        }
    }
}

/// A pending topology mutation, applied atomically at the next step
/// boundary.
pub enum TopologyChange {
    AddWorker(Box<crate::graph::automa::PendingAddWorker>),
    RemoveWorker(WorkerKey),
    AddDependency { key: WorkerKey, dependency: WorkerKey },
}

/// Persistent state only: everything that round-trips through a snapshot.
/// Deliberately excludes `Arc<dyn Worker>` bodies, which cannot be
/// serialized; `load_from_snapshot` recovers them from the caller's own
/// worker registrations instead.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistentState {
    pub workers: IndexMap<WorkerKey, WorkerMeta>,
    pub forwards: IndexMap<WorkerKey, Vec<WorkerKey>>,
    pub dynamic_triggers: IndexMap<WorkerKey, IndexSet<WorkerKey>>,
    pub output_buffer: IndexMap<WorkerKey, Value>,
    pub output_worker_key: Option<WorkerKey>,
    pub running: bool,
    pub current_kickoff: Vec<KickoffInfo>,
    pub input_buffer: WorkerArgs,
    pub ongoing_interactions: IndexMap<WorkerKey, Vec<InteractionAndFeedback>>,
    pub worker_interaction_indices: FxHashMap<WorkerKey, u64>,
    /// Nested `GraphAutoma` workers' own persistent state, keyed by the
    /// worker key that holds them in `workers`. Populated recursively so a
    /// root snapshot covers the whole composition transitively.
    pub nested: IndexMap<WorkerKey, PersistentState>,
}

/// The serializable projection of a [`GraphWorker`]'s metadata — everything
/// except the worker body itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerMeta {
    pub dependencies: Vec<WorkerKey>,
    pub is_start: bool,
    pub is_output: bool,
    pub args_mapping_rule: ArgsMappingRule,
}

impl WorkerMeta {
    pub fn of(record: &GraphWorker) -> Self {
        Self {
            dependencies: record.dependencies.clone(),
            is_start: record.is_start,
            is_output: record.is_output,
            args_mapping_rule: record.args_mapping_rule,
        }
    }
}

/// The live, in-memory half of GraphAutoma state: everything that is
/// rebuilt fresh on every process (running tasks, deferred queues, event
/// handlers) lives in [`crate::graph::automa::Shared`], not here — this
/// struct holds exactly the persistent fields in their *live* (not
/// serialization) representation, i.e. with real `GraphWorker` records.
pub struct AutomaState {
    pub workers: IndexMap<WorkerKey, GraphWorker>,
    pub forwards: IndexMap<WorkerKey, Vec<WorkerKey>>,
    pub dynamic_triggers: IndexMap<WorkerKey, IndexSet<WorkerKey>>,
    pub output_buffer: IndexMap<WorkerKey, Value>,
    pub output_worker_key: Option<WorkerKey>,
    pub running: bool,
    pub current_kickoff: Vec<KickoffInfo>,
    pub input_buffer: WorkerArgs,
    pub ongoing_interactions: IndexMap<WorkerKey, Vec<InteractionAndFeedback>>,
    pub worker_interaction_indices: FxHashMap<WorkerKey, u64>,
    pub local_space: FxHashMap<WorkerKey, Value>,
    pub reset_local_space: bool,
}

impl Default for AutomaState {
    fn default() -> Self {
        Self {
            workers: IndexMap::new(),
            forwards: IndexMap::new(),
            dynamic_triggers: IndexMap::new(),
            output_buffer: IndexMap::new(),
            output_worker_key: None,
            running: false,
            current_kickoff: Vec::new(),
            input_buffer: WorkerArgs::new(),
            ongoing_interactions: IndexMap::new(),
            worker_interaction_indices: FxHashMap::default(),
            local_space: FxHashMap::default(),
            reset_local_space: true,
        }
    }
}

impl AutomaState {
    /// Rebuild `forwards` from `dependencies` over the current `workers`.
    pub fn recompute_forwards(&mut self) {
        let mut forwards: IndexMap<WorkerKey, Vec<WorkerKey>> =
            self.workers.keys().map(|k| (k.clone(), Vec::new())).collect();
        for (key, record) in &self.workers {
            for dep in &record.dependencies {
                forwards.entry(dep.clone()).or_default().push(key.clone());
            }
        }
        self.forwards = forwards;
    }
}
