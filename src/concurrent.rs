//! `ConcurrentGraph`: a flat collection of dependency-free workers run in
//! parallel and reduced to an ordered vector of results (§4.6).

use crate::errors::{AutomaError, WorkerError};
use crate::types::WorkerKey;
use crate::value::{ConcurrentInput, WorkerArgs};
use crate::worker::{ParameterKinds, SchedulerAccess, Worker, WorkerContext};
use async_trait::async_trait;
use futures_util::future::join_all;
use indexmap::IndexMap;
use miette::Diagnostic;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConcurrentError {
    #[error("InOrder input has {given} element(s) but {expected} worker(s) are registered")]
    #[diagnostic(code(graphautoma::concurrent::arity_mismatch))]
    ArityMismatch { given: usize, expected: usize },

    #[error("{failed} of {total} branch worker(s) failed")]
    #[diagnostic(code(graphautoma::concurrent::branch_failed))]
    BranchFailed {
        failed: usize,
        total: usize,
        #[source]
        first: Box<WorkerError>,
    },
}

/// A flat set of independently runnable workers with no dependency edges
/// between them (§4.6). Itself a `Worker`, so it composes inside a
/// `GraphAutoma` the same way a nested `GraphAutoma` does.
pub struct ConcurrentGraph {
    name: String,
    workers: IndexMap<WorkerKey, Arc<dyn Worker>>,
}

impl ConcurrentGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workers: IndexMap::new(),
        }
    }

    pub fn add_worker(&mut self, key: impl Into<WorkerKey>, worker: Arc<dyn Worker>) {
        self.workers.insert(key.into(), worker);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_keys(&self) -> Vec<WorkerKey> {
        self.workers.keys().cloned().collect()
    }

    /// Runs every registered worker concurrently. `Broadcast` hands the same
    /// value to each branch; `InOrder` pairs the i-th input with the i-th
    /// registered worker (registration order) and is an arity mismatch if
    /// the lengths disagree.
    pub async fn run_concurrent(
        &self,
        input: ConcurrentInput,
        scheduler: Arc<dyn SchedulerAccess>,
    ) -> Result<Vec<Value>, AutomaError> {
        let per_worker_args: Vec<(WorkerKey, Arc<dyn Worker>, WorkerArgs)> = match input {
            ConcurrentInput::Broadcast(value) => self
                .workers
                .iter()
                .map(|(k, w)| (k.clone(), w.clone(), WorkerArgs::single(value.clone())))
                .collect(),
            ConcurrentInput::InOrder(values) => {
                if values.len() != self.workers.len() {
                    return Err(AutomaError::WorkerFailed {
                        key: self.name.clone(),
                        source: Box::new(ConcurrentError::ArityMismatch {
                            given: values.len(),
                            expected: self.workers.len(),
                        }),
                    });
                }
                self.workers
                    .iter()
                    .zip(values)
                    .map(|((k, w), v)| (k.clone(), w.clone(), WorkerArgs::single(v)))
                    .collect()
            }
        };

        let total = per_worker_args.len();
        let results = join_all(per_worker_args.into_iter().map(|(key, worker, args)| {
            let ctx = WorkerContext::new(key.clone(), scheduler.clone());
            async move { (key, worker.run(args, ctx).await) }
        }))
        .await;

        let mut values = Vec::with_capacity(total);
        let mut first_failure: Option<(WorkerKey, WorkerError)> = None;
        let mut failed = 0usize;
        for (key, result) in results {
            match result {
                Ok(v) => values.push(v),
                Err(e) => {
                    failed += 1;
                    if first_failure.is_none() {
                        first_failure = Some((key, e));
                    }
                }
            }
        }

        if let Some((_, first)) = first_failure {
            return Err(AutomaError::WorkerFailed {
                key: self.name.clone(),
                source: Box::new(ConcurrentError::BranchFailed {
                    failed,
                    total,
                    first: Box::new(first),
                }),
            });
        }

        Ok(values)
    }
}

#[async_trait]
impl Worker for ConcurrentGraph {
    async fn run(&self, args: WorkerArgs, ctx: WorkerContext) -> Result<Value, WorkerError> {
        let input = match args.args.first() {
            Some(Value::Array(items)) if items.len() == self.workers.len() => {
                ConcurrentInput::InOrder(items.clone())
            }
            Some(v) => ConcurrentInput::Broadcast(v.clone()),
            None => ConcurrentInput::Broadcast(Value::Null),
        };
        let scheduler = ctx.scheduler_handle();
        let values = self
            .run_concurrent(input, scheduler)
            .await
            .map_err(WorkerError::failed)?;
        Ok(Value::Array(values))
    }

    fn parameter_kinds(&self) -> ParameterKinds {
        ParameterKinds::open()
    }

    fn is_automa(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
