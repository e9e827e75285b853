//! # GraphAutoma: a single-threaded, dynamically-dispatched worker scheduler
//!
//! `GraphAutoma` runs a mutable DAG of [`worker::Worker`]s that pull their
//! arguments from predecessors' outputs and get retried as soon as all of
//! their current dependencies are satisfied — there is no fixed superstep
//! barrier. A worker can rewrite the graph around itself mid-run (add/remove
//! workers, add a dependency), bypass dependency gating entirely with
//! `ctx.ferry_to`, and suspend the whole run to ask a host for input via
//! `ctx.request_feedback`/`interact_with_human`.
//!
//! ## Core Concepts
//!
//! - **[`worker::Worker`]** — the async unit of work every node in the graph
//!   implements; [`callable::CallableWorker`] adapts a plain closure into one.
//! - **[`graph::GraphAutoma`]** — owns the worker table, dependency edges,
//!   dynamic state, and the run loop itself (`run`).
//! - **[`concurrent`]** — `ConcurrentGraph`, a flat fan-out/fan-in of
//!   dependency-free workers reduced to an ordered result vector.
//! - **[`args_mapping`]** — how a worker's declared dependencies become its
//!   positional/keyword arguments (MERGE, UNPACK, PASSTHROUGH).
//! - **[`snapshot`]/[`snapshot_store`]** — capturing and restoring the
//!   persistent half of a suspended run's state.
//! - **[`interaction`]** — the human-in-the-loop pause/resume primitives.
//! - **[`event_bus`]** — an optional host-observability side channel a
//!   `GraphAutoma` can be told to mirror its events into.
//! - **[`errors`]** — the error taxonomy every fallible entry point returns.
//!
//! ## Quick Start
//!
//! ```
//! use graphautoma::graph::GraphAutoma;
//! use graphautoma::types::ArgsMappingRule;
//! use graphautoma::value::WorkerArgs;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let automa = GraphAutoma::new("add-one");
//!
//! automa.add_func_as_worker(
//!     "increment",
//!     |args, _ctx| {
//!         let n = args.args.first().and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(json!(n + 1))
//!     },
//!     vec![],
//!     true,
//!     true,
//!     ArgsMappingRule::Merge,
//! )?;
//!
//! let result = automa.run(WorkerArgs::positional(vec![json!(41)]), vec![]).await?;
//! assert_eq!(result, json!(42));
//! # Ok(())
//! # }
//! ```
//!
//! ### Attaching host observability
//!
//! ```
//! use graphautoma::event_bus::{EventBus, MemorySink};
//! use graphautoma::graph::GraphAutoma;
//!
//! let sink = MemorySink::new();
//! let bus = EventBus::with_sink(sink.clone());
//! bus.listen_for_events();
//!
//! let automa = GraphAutoma::new("observed");
//! automa.attach_event_bus(&bus);
//! ```
//!
//! ## Module Guide
//!
//! - [`worker`] — the `Worker` trait, `WorkerContext`, `SchedulerAccess`
//! - [`callable`] — adapts closures/functions into `Worker`s
//! - [`graph`] — `GraphAutoma` itself: topology, run loop, snapshots
//! - [`concurrent`] — `ConcurrentGraph` fan-out/fan-in helper
//! - [`args_mapping`] — dependency-to-argument mapping rules
//! - [`interaction`] — human-in-the-loop pause/resume types
//! - [`snapshot`] / [`snapshot_store`] — persistent-state capture/restore
//! - [`event_bus`] — optional broadcast of observed events to host sinks
//! - [`telemetry`] — tracing bootstrap and event-bus sink formatting
//! - [`errors`] — the error taxonomy
//! - [`types`] / [`value`] — shared scalar types and the dynamic value model

pub mod args_mapping;
pub mod callable;
pub mod concurrent;
pub mod errors;
pub mod event_bus;
pub mod graph;
pub mod interaction;
pub mod snapshot;
pub mod snapshot_store;
pub mod telemetry;
pub mod types;
pub mod value;
pub mod worker;
