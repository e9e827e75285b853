//! The `GraphAutoma` scheduler: dynamic dispatch loop, topology mutation,
//! cooperative suspension, and snapshot/resume.

use crate::args_mapping::{map_args, propagate_and_check};
use crate::errors::{AutomaError, RuntimeError, WorkerError};
use crate::graph::record::GraphWorker;
use crate::graph::state::{AutomaState, KickoffInfo, PersistentState, TopologyChange, WorkerMeta};
use crate::graph::validate;
use crate::interaction::{Feedback, Interaction, InteractionAndFeedback, InteractionEvent};
use crate::snapshot::{Snapshot, SnapshotError};
use crate::types::{ArgsMappingRule, WorkerKey};
use crate::value::WorkerArgs;
use crate::worker::{ParameterKinds, SchedulerAccess, Worker, WorkerContext};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::instrument;

// Child module: needs field-level access to `Inner`, which Rust's privacy
// rules grant to descendants of the defining module but not to siblings.
mod step;

/// A handler for `post_event`/`request_feedback`. Synchronous and invoked
/// directly on the caller's thread/task — there is no hidden dispatch
/// through a queue or another task.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &InteractionEvent) -> Option<Feedback>;
}

impl<F> EventHandler for F
where
    F: Fn(&InteractionEvent) -> Option<Feedback> + Send + Sync,
{
    fn handle(&self, event: &InteractionEvent) -> Option<Feedback> {
        self(event)
    }
}

/// Handle to a background blocking-work executor. A thin wrapper over
/// `tokio::task::spawn_blocking` rather than a bespoke thread pool —
/// tokio's blocking pool already provides a separate background executor
/// for blocking worker bodies to run on.
pub struct WorkerPool;

impl WorkerPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    pub fn spawn_blocking<F, T>(&self, f: F) -> tokio::task::JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
    }
}

/// A worker registration awaiting application at the next step boundary.
pub struct PendingAddWorker {
    pub key: WorkerKey,
    pub worker: Arc<dyn Worker>,
    pub dependencies: Vec<WorkerKey>,
    pub is_start: bool,
    pub is_output: bool,
    pub args_mapping_rule: ArgsMappingRule,
}

struct Inner {
    name: String,
    state: AutomaState,
    topology_deferred: Vec<TopologyChange>,
    set_output_deferred: Option<WorkerKey>,
    ferry_deferred: Vec<(WorkerKey, WorkerArgs)>,
    event_handlers: IndexMap<Option<String>, Vec<Arc<dyn EventHandler>>>,
    parent: Option<Weak<Mutex<Inner>>>,
    main_loop_handle: Option<tokio::runtime::Handle>,
    main_thread_id: Option<std::thread::ThreadId>,
    worker_pool: Option<Arc<WorkerPool>>,
    event_emitter: Option<Arc<dyn crate::event_bus::EventEmitter>>,
    /// True only while a `run()` call is actually executing on this
    /// process. Distinct from `state.running`, which is persistent and
    /// stays set across an `InteractionException` suspension (the graph is
    /// still mid-run, and that flag round-trips through a snapshot). A
    /// subsequent `run()` call on the same instance resuming that
    /// suspension must NOT be blocked as reentrant — only a genuinely
    /// concurrent second call should be rejected.
    in_run: bool,
}

/// Owns the worker table, dependency/forward edges, dynamic state, output
/// buffer, pending deferred operations, and the run loop. Is itself a
/// [`Worker`], so it composes: register one `GraphAutoma` as a worker
/// inside another via plain `add_worker`.
///
/// A cheap-to-clone handle over `Arc<Mutex<Inner>>` — cloning shares the
/// same scheduler state, which is what lets a nested `GraphAutoma` and its
/// `WorkerContext`-issued callbacks reach back into the same instance while
/// the outer run loop's `await` points are suspended.
#[derive(Clone)]
pub struct GraphAutoma {
    inner: Arc<Mutex<Inner>>,
}

impl GraphAutoma {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_worker_pool(name, None)
    }

    pub fn with_worker_pool(name: impl Into<String>, worker_pool: Option<Arc<WorkerPool>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                name: name.into(),
                state: AutomaState::default(),
                topology_deferred: Vec::new(),
                set_output_deferred: None,
                ferry_deferred: Vec::new(),
                event_handlers: IndexMap::new(),
                parent: None,
                main_loop_handle: None,
                main_thread_id: None,
                worker_pool,
                event_emitter: None,
                in_run: false,
            })),
        }
    }

    /// Attaches a host-observability [`crate::event_bus::EventBus`]: every
    /// `post_event`/`request_feedback*` call is mirrored to it in addition
    /// to the synchronous `EventHandler` dispatch. Only the root instance's
    /// attachment is consulted (nested automata forward
    /// through `dispatch_to_handlers`'s own root-finding, mirrored the same
    /// way here so a sub-automa's events still reach the bus the root was
    /// given).
    pub fn attach_event_bus(&self, bus: &crate::event_bus::EventBus) {
        self.inner.lock().event_emitter = Some(bus.get_emitter());
    }

    /// Mirrors a `post_event`/`request_feedback*` call to the attached
    /// event bus, if any. `SchedulerAccess::post_event` only carries the
    /// `{type, data}` payload (the worker identity lives on `WorkerContext`,
    /// the caller, not the callee), so the mirror is a diagnostic rather
    /// than a `PostedEvent` keyed by worker.
    fn mirror_to_bus(&self, event: &InteractionEvent) {
        let root = self.root();
        let emitter = root.inner.lock().event_emitter.clone();
        if let Some(emitter) = emitter {
            let diagnostic = crate::event_bus::Event::diagnostic(
                event.event_type.clone(),
                event.data.to_string(),
            );
            let _ = emitter.emit(diagnostic);
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state.running
    }

    pub fn parent(&self) -> Option<GraphAutoma> {
        let guard = self.inner.lock();
        guard
            .parent
            .as_ref()
            .and_then(|w| w.upgrade())
            .map(|inner| GraphAutoma { inner })
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    pub fn root(&self) -> GraphAutoma {
        match self.parent() {
            Some(p) => p.root(),
            None => self.clone(),
        }
    }

    fn set_parent(&self, parent: &GraphAutoma) {
        self.inner.lock().parent = Some(Arc::downgrade(&parent.inner));
    }

    /// Opt out of the default local-space reset on every completed run.
    pub fn set_reset_local_space(&self, reset: bool) {
        self.inner.lock().state.reset_local_space = reset;
    }

    pub fn all_workers(&self) -> Vec<WorkerKey> {
        self.inner.lock().state.workers.keys().cloned().collect()
    }

    /// Returns `key`'s wrapped worker downcast to a nested `GraphAutoma`, or
    /// `None` if it does not exist or is not one (used by `crate::snapshot`
    /// to recurse without needing field access into `Inner`).
    pub(crate) fn nested_automa(&self, key: &WorkerKey) -> Option<GraphAutoma> {
        let guard = self.inner.lock();
        guard
            .state
            .workers
            .get(key)?
            .worker
            .as_any()
            .downcast_ref::<GraphAutoma>()
            .cloned()
    }

    pub fn output_worker_key(&self) -> Option<WorkerKey> {
        self.inner.lock().state.output_worker_key.clone()
    }

    /// Init phase applies immediately; running phase overwrites any
    /// existing pending change so only the last wins.
    pub fn set_output_worker_key(&self, key: WorkerKey) {
        let mut guard = self.inner.lock();
        if guard.state.running {
            guard.set_output_deferred = Some(key);
        } else {
            guard.state.output_worker_key = Some(key);
        }
    }

    #[instrument(skip(self, worker), fields(key = %key))]
    pub fn add_worker(
        &self,
        key: impl Into<WorkerKey>,
        worker: Arc<dyn Worker>,
        dependencies: Vec<WorkerKey>,
        is_start: bool,
        is_output: bool,
        args_mapping_rule: ArgsMappingRule,
    ) -> Result<(), AutomaError> {
        let key = key.into();
        if let Some(nested) = worker.as_any().downcast_ref::<GraphAutoma>() {
            nested.set_parent(self);
        }

        let mut guard = self.inner.lock();
        if guard.state.running {
            guard.topology_deferred.push(TopologyChange::AddWorker(Box::new(
                PendingAddWorker {
                    key,
                    worker,
                    dependencies,
                    is_start,
                    is_output,
                    args_mapping_rule,
                },
            )));
            return Ok(());
        }

        if guard.state.workers.contains_key(&key) {
            return Err(RuntimeError::DuplicateAdd { key }.into());
        }
        let record =
            GraphWorker::new(key.clone(), worker, dependencies, is_start, is_output, args_mapping_rule)
                .map_err(AutomaError::from)?;
        guard.state.workers.insert(key, record);
        guard.state.recompute_forwards();
        Ok(())
    }

    pub fn add_func_as_worker<F>(
        &self,
        key: impl Into<WorkerKey>,
        func: F,
        dependencies: Vec<WorkerKey>,
        is_start: bool,
        is_output: bool,
        args_mapping_rule: ArgsMappingRule,
    ) -> Result<(), AutomaError>
    where
        F: Fn(WorkerArgs, WorkerContext) -> Result<Value, WorkerError> + Send + Sync + 'static,
    {
        let worker: Arc<dyn Worker> = Arc::new(crate::callable::CallableWorker::from_sync(func));
        self.add_worker(key, worker, dependencies, is_start, is_output, args_mapping_rule)
    }

    pub fn remove_worker(&self, key: impl Into<WorkerKey>) -> Result<(), AutomaError> {
        let key = key.into();
        let mut guard = self.inner.lock();
        if guard.state.running {
            guard.topology_deferred.push(TopologyChange::RemoveWorker(key));
            return Ok(());
        }
        if guard.state.workers.shift_remove(&key).is_none() {
            return Err(RuntimeError::RemoveUnknown { key }.into());
        }
        apply_remove_worker(&mut guard.state, &key);
        Ok(())
    }

    pub fn add_dependency(
        &self,
        key: impl Into<WorkerKey>,
        dependency: impl Into<WorkerKey>,
    ) -> Result<(), AutomaError> {
        let key = key.into();
        let dependency = dependency.into();
        let mut guard = self.inner.lock();
        if guard.state.running {
            guard
                .topology_deferred
                .push(TopologyChange::AddDependency { key, dependency });
            return Ok(());
        }
        if !guard.state.workers.contains_key(&key) {
            return Err(RuntimeError::UnknownDependencyEndpoint { key }.into());
        }
        if !guard.state.workers.contains_key(&dependency) {
            return Err(RuntimeError::UnknownDependencyEndpoint { key: dependency }.into());
        }
        apply_add_dependency(&mut guard.state, &key, &dependency)?;
        Ok(())
    }

    /// Queues a control-transfer that bypasses dependency gating and
    /// argument mapping entirely.
    pub fn ferry_to(&self, worker_key: impl Into<WorkerKey>, args: WorkerArgs) {
        let worker_key = worker_key.into();
        self.inner.lock().ferry_deferred.push((worker_key, args));
    }

    pub fn register_event_handler(
        &self,
        event_type: Option<String>,
        handler: Arc<dyn EventHandler>,
    ) {
        self.inner
            .lock()
            .event_handlers
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    pub fn unregister_event_handlers(&self, event_type: Option<String>) {
        self.inner.lock().event_handlers.shift_remove(&event_type);
    }

    fn dispatch_to_handlers(&self, event: &InteractionEvent) -> Option<Feedback> {
        let root = self.root();
        let guard = root.inner.lock();
        if let Some(handlers) = guard.event_handlers.get(&Some(event.event_type.clone())) {
            for h in handlers {
                if let Some(fb) = h.handle(event) {
                    return Some(fb);
                }
            }
        }
        if let Some(handlers) = guard.event_handlers.get(&None) {
            for h in handlers {
                if let Some(fb) = h.handle(event) {
                    return Some(fb);
                }
            }
        }
        None
    }

    /// The top-level entry point. Not re-entrant on the same instance — a
    /// genuinely concurrent second call fails, but a call that resumes a
    /// run suspended on an interaction is not reentrancy and must succeed.
    #[instrument(skip(self, args, feedbacks), fields(name = %self.name()))]
    pub async fn run(
        &self,
        args: WorkerArgs,
        feedbacks: Vec<Feedback>,
    ) -> Result<Value, AutomaError> {
        {
            let mut guard = self.inner.lock();
            if guard.in_run {
                return Err(RuntimeError::ReentrantRun { name: guard.name.clone() }.into());
            }
            guard.in_run = true;
            guard.main_loop_handle = Some(tokio::runtime::Handle::current());
            guard.main_thread_id = Some(std::thread::current().id());
        }

        let result = self.run_body(args, feedbacks).await;
        self.inner.lock().in_run = false;
        result
    }

    async fn run_body(
        &self,
        args: WorkerArgs,
        feedbacks: Vec<Feedback>,
    ) -> Result<Value, AutomaError> {
        self.apply_resume_feedbacks(feedbacks)?;

        let already_running_from_resume = self.inner.lock().state.running;
        if !already_running_from_resume {
            self.begin_run(args)?;
        }

        loop {
            let kickoff = {
                let guard = self.inner.lock();
                guard.state.current_kickoff.clone()
            };
            if kickoff.is_empty() {
                break;
            }
            step::run_step(self).await?;
        }

        let mut guard = self.inner.lock();
        guard.state.running = false;
        if guard.state.reset_local_space {
            guard.state.local_space.clear();
        }
        let result = guard
            .state
            .output_worker_key
            .clone()
            .and_then(|k| guard.state.output_buffer.get(&k).cloned())
            .unwrap_or(Value::Null);
        Ok(result)
    }

    /// Run setup: validate, compute `forwards`, seed triggers and the
    /// initial wavefront from `is_start` workers.
    fn begin_run(&self, args: WorkerArgs) -> Result<(), AutomaError> {
        let mut guard = self.inner.lock();
        if guard.state.output_worker_key.is_none() {
            // No explicit `output_worker_key` set via `set_output_worker_key`:
            // adopt the worker registered with `is_output == true`, last one
            // wins (mirrors the original's "set the last one" semantics for
            // `@worker(is_output=True)`).
            if let Some(key) = guard
                .state
                .workers
                .iter()
                .filter(|(_, w)| w.is_output)
                .map(|(k, _)| k.clone())
                .last()
            {
                guard.state.output_worker_key = Some(key);
            }
        }
        validate::validate_all(&guard.state.workers, guard.state.output_worker_key.as_ref())?;
        guard.state.recompute_forwards();

        let keys: Vec<WorkerKey> = guard.state.workers.keys().cloned().collect();
        for key in &keys {
            let deps: indexmap::IndexSet<WorkerKey> = guard.state.workers[key]
                .dependencies
                .iter()
                .cloned()
                .collect();
            guard.state.dynamic_triggers.insert(key.clone(), deps);
        }

        let starts: Vec<WorkerKey> = keys
            .iter()
            .filter(|k| guard.state.workers[*k].is_start)
            .cloned()
            .collect();
        guard.state.current_kickoff = starts
            .into_iter()
            .map(|k| KickoffInfo::top_level(k, args.clone()))
            .collect();
        guard.state.input_buffer = args;
        guard.state.running = true;
        Ok(())
    }

    /// Overlays `feedbacks` onto stored `ongoing_interactions` so a resumed
    /// `interact_with_human` call sees them on its next index lookup. A
    /// feedback's matching interaction may live on a nested `GraphAutoma`
    /// several levels down, so each one is searched for recursively rather
    /// than only against this instance's own state.
    fn apply_resume_feedbacks(&self, feedbacks: Vec<Feedback>) -> Result<(), AutomaError> {
        for fb in &feedbacks {
            self.apply_single_feedback(fb);
        }
        Ok(())
    }

    fn apply_single_feedback(&self, fb: &Feedback) -> bool {
        {
            let mut guard = self.inner.lock();
            for pairs in guard.state.ongoing_interactions.values_mut() {
                for pair in pairs.iter_mut() {
                    if pair.interaction.interaction_id == fb.interaction_id {
                        pair.feedback = Some(fb.clone());
                        return true;
                    }
                }
            }
        }
        for key in self.all_workers() {
            if let Some(nested) = self.nested_automa(&key) {
                if nested.apply_single_feedback(fb) {
                    return true;
                }
            }
        }
        false
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }

    /// Overlays a snapshot's persistent dynamic state onto `self`, which
    /// must already have the same topology registered (same `add_worker`
    /// calls) as when the snapshot was taken.
    pub fn load_from_snapshot(self, snapshot: &Snapshot) -> Result<Self, SnapshotError> {
        crate::snapshot::restore(&self, snapshot)?;
        Ok(self)
    }

    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// The local (non-recursive) half of this instance's persistent state.
    /// `crate::snapshot` drives recursion into nested `GraphAutoma`s itself,
    /// using `all_workers` plus the same `as_any` downcast `add_worker` uses
    /// to find its parent.
    pub(crate) fn export_persistent_local(&self) -> PersistentState {
        let guard = self.inner.lock();
        PersistentState {
            workers: guard
                .state
                .workers
                .iter()
                .map(|(k, record)| (k.clone(), WorkerMeta::of(record)))
                .collect(),
            forwards: guard.state.forwards.clone(),
            dynamic_triggers: guard.state.dynamic_triggers.clone(),
            output_buffer: guard.state.output_buffer.clone(),
            output_worker_key: guard.state.output_worker_key.clone(),
            running: guard.state.running,
            current_kickoff: guard.state.current_kickoff.clone(),
            input_buffer: guard.state.input_buffer.clone(),
            ongoing_interactions: guard.state.ongoing_interactions.clone(),
            worker_interaction_indices: guard.state.worker_interaction_indices.clone(),
            nested: IndexMap::new(),
        }
    }

    /// Overlays a previously-exported local half back onto `self`. Assumes
    /// the caller already validated `data.workers` against the live
    /// topology (`crate::snapshot::restore`).
    pub(crate) fn import_persistent_local(&self, data: &PersistentState) {
        let mut guard = self.inner.lock();
        guard.state.forwards = data.forwards.clone();
        guard.state.dynamic_triggers = data.dynamic_triggers.clone();
        guard.state.output_buffer = data.output_buffer.clone();
        guard.state.output_worker_key = data.output_worker_key.clone();
        guard.state.running = data.running;
        guard.state.current_kickoff = data.current_kickoff.clone();
        guard.state.input_buffer = data.input_buffer.clone();
        guard.state.ongoing_interactions = data.ongoing_interactions.clone();
        guard.state.worker_interaction_indices = data.worker_interaction_indices.clone();
    }
}

fn apply_remove_worker(state: &mut AutomaState, key: &WorkerKey) {
    state.forwards.shift_remove(key);
    for forwards in state.forwards.values_mut() {
        forwards.retain(|k| k != key);
    }
    for record in state.workers.values_mut() {
        record.dependencies.retain(|d| d != key);
    }
    state.dynamic_triggers.shift_remove(key);
    for triggers in state.dynamic_triggers.values_mut() {
        triggers.shift_remove(key);
    }
    state.ongoing_interactions.shift_remove(key);
    state.worker_interaction_indices.remove(key);
    state.recompute_forwards();
}

fn apply_add_dependency(
    state: &mut AutomaState,
    key: &WorkerKey,
    dependency: &WorkerKey,
) -> Result<(), AutomaError> {
    let record = state
        .workers
        .get_mut(key)
        .ok_or_else(|| RuntimeError::UnknownDependencyEndpoint { key: key.clone() })?;
    if record.dependencies.contains(dependency) {
        return Err(RuntimeError::DuplicateEdge {
            key: key.clone(),
            dependency: dependency.clone(),
        }
        .into());
    }
    record.dependencies.push(dependency.clone());
    state.recompute_forwards();
    // A newly added dependency appears in the trigger set immediately; it
    // is not auto-cleared even if the dependency's output already exists —
    // the dependent is retried by a future kickoff.
    state
        .dynamic_triggers
        .entry(key.clone())
        .or_default()
        .insert(dependency.clone());
    Ok(())
}

pub(crate) fn apply_topology_change(state: &mut AutomaState, change: TopologyChange) {
    match change {
        TopologyChange::AddWorker(pending) => {
            if state.workers.contains_key(&pending.key) {
                return; // duplicate add observed at application time: ignored, matching remove's discard semantics for deferred application
            }
            if let Ok(record) = GraphWorker::new(
                pending.key.clone(),
                pending.worker,
                pending.dependencies,
                pending.is_start,
                pending.is_output,
                pending.args_mapping_rule,
            ) {
                let deps: indexmap::IndexSet<WorkerKey> =
                    record.dependencies.iter().cloned().collect();
                state.workers.insert(pending.key.clone(), record);
                state.dynamic_triggers.insert(pending.key, deps);
                state.recompute_forwards();
            }
        }
        TopologyChange::RemoveWorker(key) => {
            if state.workers.shift_remove(&key).is_some() {
                apply_remove_worker(state, &key);
            }
        }
        TopologyChange::AddDependency { key, dependency } => {
            let _ = apply_add_dependency_silent(state, &key, &dependency);
        }
    }
}

fn apply_add_dependency_silent(
    state: &mut AutomaState,
    key: &WorkerKey,
    dependency: &WorkerKey,
) -> Option<()> {
    if !state.workers.contains_key(key) || !state.workers.contains_key(dependency) {
        return None;
    }
    let record = state.workers.get_mut(key)?;
    if record.dependencies.contains(dependency) {
        return None;
    }
    record.dependencies.push(dependency.clone());
    state.recompute_forwards();
    state
        .dynamic_triggers
        .entry(key.clone())
        .or_default()
        .insert(dependency.clone());
    Some(())
}

#[async_trait]
impl Worker for GraphAutoma {
    async fn run(&self, args: WorkerArgs, _ctx: WorkerContext) -> Result<Value, WorkerError> {
        match GraphAutoma::run(self, args, Vec::new()).await {
            Ok(value) => Ok(value),
            Err(AutomaError::Interaction(exc)) => Err(WorkerError::Interact(exc.interactions)),
            Err(AutomaError::BubbledInteraction(ints)) => Err(WorkerError::Interact(ints)),
            Err(other) => Err(WorkerError::failed(other)),
        }
    }

    fn parameter_kinds(&self) -> ParameterKinds {
        ParameterKinds::open()
    }

    fn is_automa(&self) -> bool {
        true
    }

    fn should_reset_local_space(&self) -> bool {
        self.inner.lock().state.reset_local_space
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl SchedulerAccess for GraphAutoma {
    fn post_event(&self, event: InteractionEvent) {
        self.mirror_to_bus(&event);
        self.dispatch_to_handlers(&event);
    }

    async fn request_feedback_async(
        &self,
        event: InteractionEvent,
        timeout: Option<Duration>,
    ) -> Result<Feedback, WorkerError> {
        self.mirror_to_bus(&event);
        let this = self.clone();
        let attempt = async move {
            this.dispatch_to_handlers(&event)
                .ok_or(RuntimeError::UnknownWorker {
                    key: "<event-handler>".to_string(),
                })
        };
        match timeout {
            Some(d) => tokio::time::timeout(d, attempt)
                .await
                .map_err(|_| {
                    WorkerError::from(RuntimeError::FeedbackTimeout {
                        timeout_ms: d.as_millis(),
                    })
                })?
                .map_err(WorkerError::from),
            None => attempt.await.map_err(WorkerError::from),
        }
    }

    fn request_feedback_blocking(
        &self,
        event: InteractionEvent,
        timeout: Option<Duration>,
    ) -> Result<Feedback, WorkerError> {
        self.mirror_to_bus(&event);
        let (main_thread, main_handle) = {
            let guard = self.inner.lock();
            (guard.main_thread_id, guard.main_loop_handle.clone())
        };
        if main_thread == Some(std::thread::current().id()) {
            return Err(RuntimeError::MainThreadFeedback.into());
        }
        let handle = main_handle.ok_or(RuntimeError::MainThreadFeedback)?;
        let this = self.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        handle.spawn(async move {
            let result = this.dispatch_to_handlers(&event);
            let _ = tx.send(result);
        });
        let received = match timeout {
            Some(d) => match rx.recv_timeout(d) {
                Ok(result) => result,
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    return Err(RuntimeError::FeedbackTimeout {
                        timeout_ms: d.as_millis(),
                    }
                    .into());
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => None,
            },
            None => rx.recv().ok().flatten(),
        };
        received.ok_or_else(|| RuntimeError::UnknownWorker {
            key: "<event-handler>".to_string(),
        }.into())
    }

    fn interact_with_human(
        &self,
        worker_key: &WorkerKey,
        event: InteractionEvent,
    ) -> Result<Feedback, WorkerError> {
        self.mirror_to_bus(&event);
        let mut guard = self.inner.lock();
        let index = *guard
            .state
            .worker_interaction_indices
            .get(worker_key)
            .unwrap_or(&0);
        guard
            .state
            .worker_interaction_indices
            .insert(worker_key.clone(), index + 1);

        let pairs = guard
            .state
            .ongoing_interactions
            .entry(worker_key.clone())
            .or_default();

        if let Some(pair) = pairs.get(index as usize) {
            if pair.interaction.event.event_type != event.event_type {
                return Err(RuntimeError::FeedbackEventTypeMismatch {
                    key: worker_key.clone(),
                    index,
                    expected: event.event_type.clone(),
                    actual: pair.interaction.event.event_type.clone(),
                }
                .into());
            }
            if let Some(fb) = &pair.feedback {
                return Ok(fb.clone());
            }
            return Err(WorkerError::Interact(vec![pair.interaction.clone()]));
        }

        let interaction = Interaction::fresh(event);
        pairs.push(InteractionAndFeedback {
            interaction: interaction.clone(),
            feedback: None,
        });
        Err(WorkerError::Interact(vec![interaction]))
    }

    fn ferry_to(&self, worker_key: &WorkerKey, args: WorkerArgs) {
        GraphAutoma::ferry_to(self, worker_key.clone(), args);
    }

    fn read_local_space(&self, worker_key: &WorkerKey) -> Value {
        self.inner
            .lock()
            .state
            .local_space
            .get(worker_key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn write_local_space(&self, worker_key: &WorkerKey, value: Value) {
        self.inner
            .lock()
            .state
            .local_space
            .insert(worker_key.clone(), value);
    }
}

/// Exposed for `args_mapping`/`step` internal use: compute a
/// dependency-driven kickoff's args from the current output buffer.
pub(crate) fn compute_mapped_args(
    state: &AutomaState,
    record: &GraphWorker,
    last_kickoff_output: Option<&Value>,
) -> Result<WorkerArgs, AutomaError> {
    let mapped = map_args(
        &record.key,
        record.args_mapping_rule,
        &record.dependencies,
        &state.output_buffer,
        last_kickoff_output,
    )?;
    let mapped = propagate_and_check(&record.key, mapped, &state.input_buffer.kwargs, &record.parameter_kinds())?;
    Ok(mapped)
}
