//! The `Worker` base contract.

use crate::errors::WorkerError;
use crate::interaction::{Feedback, InteractionEvent};
use crate::types::WorkerKey;
use crate::value::WorkerArgs;
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// One parameter's name and whether it carries a default — an explicit,
/// computed-once-per-worker table standing in for runtime signature
/// introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub has_default: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_default: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_default: true,
        }
    }
}

/// A worker's input parameter shape, used by `safely_map_args` to decide
/// which propagated kwargs a worker can actually accept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterKinds {
    pub positional_only: Vec<ParamSpec>,
    pub positional_or_keyword: Vec<ParamSpec>,
    pub var_positional: Option<ParamSpec>,
    pub keyword_only: Vec<ParamSpec>,
    pub var_keyword: Option<ParamSpec>,
}

impl ParameterKinds {
    /// The default shape: accepts any positional and keyword arguments.
    /// Most `CallableWorker`s and all nested `GraphAutoma`s use this —
    /// precise introspection only matters for workers that opt into
    /// strict argument-mapping validation.
    pub fn open() -> Self {
        Self {
            var_positional: Some(ParamSpec::required("args")),
            var_keyword: Some(ParamSpec::required("kwargs")),
            ..Default::default()
        }
    }

    pub fn accepts_keyword(&self, name: &str) -> bool {
        if self.var_keyword.is_some() {
            return true;
        }
        self.positional_or_keyword.iter().any(|p| p.name == name)
            || self.keyword_only.iter().any(|p| p.name == name)
    }

    pub fn accepts_extra_positional(&self) -> bool {
        self.var_positional.is_some()
    }
}

/// Callback into the owning `GraphAutoma`'s shared runtime state, handed to
/// every running worker via [`WorkerContext`]. A trait rather than a
/// concrete type so `worker.rs` does not need to know about the scheduler's
/// internals — `graph::automa::GraphAutoma` is the sole implementor.
#[async_trait]
pub trait SchedulerAccess: Send + Sync {
    fn post_event(&self, event: InteractionEvent);

    async fn request_feedback_async(
        &self,
        event: InteractionEvent,
        timeout: Option<Duration>,
    ) -> Result<Feedback, WorkerError>;

    fn request_feedback_blocking(
        &self,
        event: InteractionEvent,
        timeout: Option<Duration>,
    ) -> Result<Feedback, WorkerError>;

    /// Returns `Ok(feedback)` if a matching stored reply exists, or
    /// `Err(WorkerError::Interact(..))` to suspend.
    fn interact_with_human(
        &self,
        worker_key: &WorkerKey,
        event: InteractionEvent,
    ) -> Result<Feedback, WorkerError>;

    fn ferry_to(&self, worker_key: &WorkerKey, args: WorkerArgs);

    fn read_local_space(&self, worker_key: &WorkerKey) -> Value;

    fn write_local_space(&self, worker_key: &WorkerKey, value: Value);
}

/// Carried into every `Worker::run` call: identifies which worker is
/// executing and provides the handful of callbacks a worker body can use
/// to reach back into the scheduler ("from inside a running worker").
#[derive(Clone)]
pub struct WorkerContext {
    worker_key: WorkerKey,
    scheduler: Arc<dyn SchedulerAccess>,
}

impl WorkerContext {
    pub fn new(worker_key: WorkerKey, scheduler: Arc<dyn SchedulerAccess>) -> Self {
        Self {
            worker_key,
            scheduler,
        }
    }

    pub fn worker_key(&self) -> &WorkerKey {
        &self.worker_key
    }

    /// Exposes the underlying scheduler handle for callers that need to
    /// hand it to another `Worker::run` invocation directly, e.g.
    /// `ConcurrentGraph::run_concurrent` fanning out to its branch workers.
    pub fn scheduler_handle(&self) -> Arc<dyn SchedulerAccess> {
        self.scheduler.clone()
    }

    pub fn post_event(&self, event_type: impl Into<String>, data: Value) {
        self.scheduler
            .post_event(InteractionEvent::new(event_type, data));
    }

    pub async fn request_feedback_async(
        &self,
        event_type: impl Into<String>,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<Feedback, WorkerError> {
        self.scheduler
            .request_feedback_async(InteractionEvent::new(event_type, data), timeout)
            .await
    }

    /// Blocking variant; callers must be running on the background executor,
    /// never on the main loop (see `RuntimeError::MainThreadFeedback`).
    pub fn request_feedback(
        &self,
        event_type: impl Into<String>,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<Feedback, WorkerError> {
        self.scheduler
            .request_feedback_blocking(InteractionEvent::new(event_type, data), timeout)
    }

    pub fn interact_with_human(
        &self,
        event_type: impl Into<String>,
        data: Value,
    ) -> Result<Feedback, WorkerError> {
        self.scheduler
            .interact_with_human(&self.worker_key, InteractionEvent::new(event_type, data))
    }

    pub fn ferry_to(&self, worker_key: impl Into<WorkerKey>, args: WorkerArgs) {
        self.scheduler.ferry_to(&worker_key.into(), args);
    }

    pub fn local_space(&self) -> Value {
        self.scheduler.read_local_space(&self.worker_key)
    }

    pub fn set_local_space(&self, value: Value) {
        self.scheduler.write_local_space(&self.worker_key, value);
    }
}

/// The abstract unit of computation. `async_trait` is used rather than
/// native `async fn` in traits so `Arc<dyn Worker>` remains object-safe.
#[async_trait]
pub trait Worker: Send + Sync {
    /// The sole execution entry point. May suspend cooperatively (I/O,
    /// `interact_with_human`, a nested graph's own suspension).
    async fn run(&self, args: WorkerArgs, ctx: WorkerContext) -> Result<Value, WorkerError>;

    /// Used by `safely_map_args` to validate/trim propagated kwargs.
    /// Defaults to accepting anything, matching `CallableWorker`'s lack of
    /// static signature introspection in Rust.
    fn parameter_kinds(&self) -> ParameterKinds {
        ParameterKinds::open()
    }

    /// True for a worker that is itself a nested `GraphAutoma` or
    /// `ConcurrentGraph` — forwarded by `GraphWorker` rather than supplied
    /// by the registering caller.
    fn is_automa(&self) -> bool {
        false
    }

    /// Whether the scheduler should clear this worker's local space after a
    /// completed top-level run. Defaults to resetting on every run.
    fn should_reset_local_space(&self) -> bool {
        true
    }

    /// Enables downcasting a type-erased `Arc<dyn Worker>` back to a
    /// concrete `GraphAutoma`/`ConcurrentGraph` for nested-snapshot
    /// recursion.
    fn as_any(&self) -> &dyn Any;
}
