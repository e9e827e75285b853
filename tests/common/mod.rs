//! Shared worker fixtures for the integration suite.

use async_trait::async_trait;
use graphautoma::errors::WorkerError;
use graphautoma::value::WorkerArgs;
use graphautoma::worker::{Worker, WorkerContext};
use serde_json::{json, Value};
use std::any::Any;

/// Adds `n` to its single numeric positional argument.
pub struct AddN(pub i64);

#[async_trait]
impl Worker for AddN {
    async fn run(&self, args: WorkerArgs, _ctx: WorkerContext) -> Result<Value, WorkerError> {
        let current = args.args.first().and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(current + self.0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns a fixed value regardless of its arguments; used for start workers
/// in fan-in scenarios.
pub struct Constant(pub Value);

#[async_trait]
impl Worker for Constant {
    async fn run(&self, _args: WorkerArgs, _ctx: WorkerContext) -> Result<Value, WorkerError> {
        Ok(self.0.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sums the single `MERGE`-produced list argument.
pub struct SumList;

#[async_trait]
impl Worker for SumList {
    async fn run(&self, args: WorkerArgs, _ctx: WorkerContext) -> Result<Value, WorkerError> {
        let list = args.args.first().and_then(Value::as_array).cloned().unwrap_or_default();
        let sum: i64 = list.iter().filter_map(Value::as_i64).sum();
        Ok(json!(sum))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Expects `UNPACK`-produced keyword args `x`/`y` and returns `x - y`.
pub struct SubtractXY;

#[async_trait]
impl Worker for SubtractXY {
    async fn run(&self, args: WorkerArgs, _ctx: WorkerContext) -> Result<Value, WorkerError> {
        let x = args.kwargs.get("x").and_then(Value::as_i64).unwrap_or(0);
        let y = args.kwargs.get("y").and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(x - y))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
