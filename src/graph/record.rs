//! The `GraphWorker` adapter: binds scheduler metadata to a `Worker`
//! without modifying it.

use crate::errors::{SignatureError, WorkerError};
use crate::types::{ArgsMappingRule, WorkerKey};
use crate::value::WorkerArgs;
use crate::worker::{ParameterKinds, Worker, WorkerContext};
use async_trait::async_trait;
use std::sync::Arc;

/// An ordered lifecycle hook invoked around a worker's execution. Kept as a
/// small trait rather than bare closures so a host can implement richer
/// hooks (metrics, structured logging) without fighting closure capture
/// rules across `Send + Sync` boundaries.
#[async_trait]
pub trait WorkerCallback: Send + Sync {
    async fn on_start(&self, _key: &WorkerKey, _args: &WorkerArgs) {}
    async fn on_success(&self, _key: &WorkerKey, _result: &serde_json::Value) {}
    async fn on_error(&self, _key: &WorkerKey, _error: &WorkerError) {}
}

/// Binds a [`Worker`] to the metadata a [`crate::graph::GraphAutoma`] needs
/// to schedule it: key, declared dependencies, start/output flags, the
/// args-mapping rule, and lifecycle callbacks.
///
/// Delegates `run`, `parameter_kinds`, and `is_automa` straight through to
/// the wrapped worker — it never re-implements or shadows them.
#[derive(Clone)]
pub struct GraphWorker {
    pub key: WorkerKey,
    pub worker: Arc<dyn Worker>,
    pub dependencies: Vec<WorkerKey>,
    pub is_start: bool,
    pub is_output: bool,
    pub args_mapping_rule: ArgsMappingRule,
    pub callbacks: Vec<Arc<dyn WorkerCallback>>,
}

impl GraphWorker {
    pub fn new(
        key: WorkerKey,
        worker: Arc<dyn Worker>,
        dependencies: Vec<WorkerKey>,
        is_start: bool,
        is_output: bool,
        args_mapping_rule: ArgsMappingRule,
    ) -> Result<Self, SignatureError> {
        if is_start && !dependencies.is_empty() {
            return Err(SignatureError::StartWorkerHasDependencies {
                key: key.clone(),
                dependencies,
            });
        }
        Ok(Self {
            key,
            worker,
            dependencies,
            is_start,
            is_output,
            args_mapping_rule,
            callbacks: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn WorkerCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn is_automa(&self) -> bool {
        self.worker.is_automa()
    }

    pub fn parameter_kinds(&self) -> ParameterKinds {
        self.worker.parameter_kinds()
    }

    pub async fn run(
        &self,
        args: WorkerArgs,
        ctx: WorkerContext,
    ) -> Result<serde_json::Value, WorkerError> {
        for cb in &self.callbacks {
            cb.on_start(&self.key, &args).await;
        }
        let result = self.worker.run(args, ctx).await;
        for cb in &self.callbacks {
            match &result {
                Ok(value) => cb.on_success(&self.key, value).await,
                Err(err) => cb.on_error(&self.key, err).await,
            }
        }
        result
    }
}
