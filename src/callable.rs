//! The `CallableWorker` adapter: wraps a plain function/closure as a
//! [`Worker`].

use crate::errors::WorkerError;
use crate::value::WorkerArgs;
use crate::worker::{ParameterKinds, Worker, WorkerContext};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

type SyncFn = dyn Fn(WorkerArgs, WorkerContext) -> Result<Value, WorkerError> + Send + Sync;
type AsyncFn =
    dyn Fn(WorkerArgs, WorkerContext) -> BoxFuture<'static, Result<Value, WorkerError>>
        + Send
        + Sync;

enum Callable {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

/// Adapts a function or closure to the `Worker` contract.
///
/// Sync and async bodies get separate constructors rather than one
/// constructor plus runtime reflection on the callable's shape:
/// `CallableWorker::from_sync` for a plain function that returns its value
/// immediately, `CallableWorker::from_async` for one that returns a future.
/// The choice is made once, at construction, and never inferred from how
/// the callable "looks". Dispatching a genuinely blocking synchronous body
/// onto a background executor is left to the worker author, e.g. by
/// wrapping the call in `tokio::task::spawn_blocking` inside their own
/// closure.
pub struct CallableWorker {
    callable: Callable,
    parameter_kinds: ParameterKinds,
}

impl CallableWorker {
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(WorkerArgs, WorkerContext) -> Result<Value, WorkerError> + Send + Sync + 'static,
    {
        Self {
            callable: Callable::Sync(Arc::new(f)),
            parameter_kinds: ParameterKinds::open(),
        }
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(WorkerArgs, WorkerContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, WorkerError>> + Send + 'static,
    {
        Self {
            callable: Callable::Async(Arc::new(move |args, ctx| Box::pin(f(args, ctx)))),
            parameter_kinds: ParameterKinds::open(),
        }
    }

    #[must_use]
    pub fn with_parameter_kinds(mut self, kinds: ParameterKinds) -> Self {
        self.parameter_kinds = kinds;
        self
    }
}

#[async_trait]
impl Worker for CallableWorker {
    async fn run(&self, args: WorkerArgs, ctx: WorkerContext) -> Result<Value, WorkerError> {
        match &self.callable {
            Callable::Sync(f) => f(args, ctx),
            Callable::Async(f) => f(args, ctx).await,
        }
    }

    fn parameter_kinds(&self) -> ParameterKinds {
        self.parameter_kinds.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
