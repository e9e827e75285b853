mod common;

use common::AddN;
use graphautoma::concurrent::ConcurrentGraph;
use graphautoma::graph::GraphAutoma;
use graphautoma::types::ArgsMappingRule;
use graphautoma::value::{ConcurrentInput, WorkerArgs};
use graphautoma::worker::SchedulerAccess;
use serde_json::json;
use std::sync::Arc;

fn scheduler_handle() -> Arc<dyn SchedulerAccess> {
    Arc::new(GraphAutoma::new("host"))
}

#[tokio::test]
async fn broadcast_runs_every_branch_with_the_same_value() {
    let mut graph = ConcurrentGraph::new("fanout");
    graph.add_worker("one", Arc::new(AddN(1)));
    graph.add_worker("two", Arc::new(AddN(2)));

    let results = graph
        .run_concurrent(ConcurrentInput::Broadcast(json!(10)), scheduler_handle())
        .await
        .unwrap();
    assert_eq!(results, vec![json!(11), json!(12)]);
}

#[tokio::test]
async fn in_order_pairs_the_ith_value_with_the_ith_worker() {
    let mut graph = ConcurrentGraph::new("fanout");
    graph.add_worker("one", Arc::new(AddN(1)));
    graph.add_worker("two", Arc::new(AddN(2)));

    let results = graph
        .run_concurrent(
            ConcurrentInput::InOrder(vec![json!(100), json!(200)]),
            scheduler_handle(),
        )
        .await
        .unwrap();
    assert_eq!(results, vec![json!(101), json!(202)]);
}

#[tokio::test]
async fn in_order_arity_mismatch_is_rejected() {
    let mut graph = ConcurrentGraph::new("fanout");
    graph.add_worker("one", Arc::new(AddN(1)));

    let err = graph
        .run_concurrent(
            ConcurrentInput::InOrder(vec![json!(1), json!(2)]),
            scheduler_handle(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, graphautoma::errors::AutomaError::WorkerFailed { .. }));
}

#[tokio::test]
async fn composes_as_a_worker_inside_a_graph_automa() {
    let automa = GraphAutoma::new("host-graph");
    let mut concurrent = ConcurrentGraph::new("fanout");
    concurrent.add_worker("one", Arc::new(AddN(1)));
    concurrent.add_worker("two", Arc::new(AddN(2)));

    automa
        .add_worker(
            "C",
            Arc::new(concurrent),
            vec![],
            true,
            true,
            ArgsMappingRule::AsIs,
        )
        .unwrap();

    let result = automa
        .run(WorkerArgs::single(json!(5)), vec![])
        .await
        .unwrap();
    assert_eq!(result, json!([6, 7]));
}
