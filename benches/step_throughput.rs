//! Benchmarks for the scheduler's run loop (spec §4.4).
//!
//! Measures:
//! - linear chains (one worker ready per step)
//! - fan-out/fan-in diamonds (a wide wavefront launched in a single step)
//! - dependency-free start worker registration (graph assembly cost alone)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use graphautoma::errors::WorkerError;
use graphautoma::graph::GraphAutoma;
use graphautoma::types::ArgsMappingRule;
use graphautoma::value::WorkerArgs;
use graphautoma::worker::{Worker, WorkerContext};
use serde_json::{json, Value};
use std::any::Any;
use tokio::runtime::Runtime;

/// A minimal no-op worker for benchmarking scheduler structure/dispatch
/// overhead in isolation from any real work.
struct BenchWorker;

#[async_trait::async_trait]
impl Worker for BenchWorker {
    async fn run(&self, args: WorkerArgs, _ctx: WorkerContext) -> Result<Value, WorkerError> {
        Ok(args.args.first().cloned().unwrap_or(Value::Null))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Start -> node_0 -> node_1 -> ... -> node_{n-1} (output).
fn build_linear_graph(node_count: usize) -> GraphAutoma {
    let automa = GraphAutoma::new("bench-linear");
    for i in 0..node_count {
        let deps = if i == 0 {
            vec![]
        } else {
            vec![format!("node_{}", i - 1)]
        };
        automa
            .add_worker(
                format!("node_{i}"),
                std::sync::Arc::new(BenchWorker),
                deps,
                i == 0,
                i == node_count - 1,
                ArgsMappingRule::AsIs,
            )
            .expect("registration should succeed");
    }
    automa
}

/// `width` independent start workers merged into a single output worker —
/// every branch is ready in the same step, exercising S2's per-step launch
/// list rather than S9's dependency-driven wavefront growth.
fn build_fanin_graph(width: usize) -> GraphAutoma {
    let automa = GraphAutoma::new("bench-fanin");
    let mut deps = Vec::with_capacity(width);
    for i in 0..width {
        let key = format!("branch_{i}");
        automa
            .add_worker(
                key.clone(),
                std::sync::Arc::new(BenchWorker),
                vec![],
                true,
                false,
                ArgsMappingRule::AsIs,
            )
            .expect("registration should succeed");
        deps.push(key);
    }
    automa
        .add_worker(
            "sink",
            std::sync::Arc::new(BenchWorker),
            deps,
            false,
            true,
            ArgsMappingRule::Merge,
        )
        .expect("registration should succeed");
    automa
}

fn bench_linear_run(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("scheduler_run_linear");

    for size in [10, 50, 100, 200] {
        group.bench_with_input(BenchmarkId::new("linear", size), &size, |b, &size| {
            b.to_async(&runtime).iter(|| async move {
                let automa = build_linear_graph(size);
                automa
                    .run(WorkerArgs::single(json!(0)), vec![])
                    .await
                    .expect("run should succeed")
            });
        });
    }

    group.finish();
}

fn bench_fanin_run(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("scheduler_run_fanin");

    for width in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::new("fanin", width), &width, |b, &width| {
            b.to_async(&runtime).iter(|| async move {
                let automa = build_fanin_graph(width);
                automa
                    .run(WorkerArgs::new(), vec![])
                    .await
                    .expect("run should succeed")
            });
        });
    }

    group.finish();
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_registration");

    for size in [10, 50, 100, 200] {
        group.bench_with_input(BenchmarkId::new("linear", size), &size, |b, &size| {
            b.iter(|| build_linear_graph(size));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_linear_run, bench_fanin_run, bench_registration);
criterion_main!(benches);
