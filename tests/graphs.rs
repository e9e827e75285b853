mod common;

use common::{AddN, Constant, SubtractXY, SumList};
use graphautoma::graph::GraphAutoma;
use graphautoma::types::ArgsMappingRule;
use graphautoma::value::WorkerArgs;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn linear_add_one_chain() {
    let automa = GraphAutoma::new("linear");
    automa
        .add_worker("A", Arc::new(AddN(1)), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    automa
        .add_worker(
            "B",
            Arc::new(AddN(10)),
            vec!["A".to_string()],
            false,
            false,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    automa
        .add_worker(
            "C",
            Arc::new(AddN(100)),
            vec!["B".to_string()],
            false,
            true,
            ArgsMappingRule::AsIs,
        )
        .unwrap();

    let result = automa
        .run(WorkerArgs::single(json!(5)), vec![])
        .await
        .unwrap();
    assert_eq!(result, json!(116));
}

#[tokio::test]
async fn merge_fan_in() {
    let automa = GraphAutoma::new("merge");
    automa
        .add_worker("A", Arc::new(Constant(json!(2))), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    automa
        .add_worker("B", Arc::new(Constant(json!(3))), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    automa
        .add_worker("C", Arc::new(Constant(json!(4))), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    automa
        .add_worker(
            "S",
            Arc::new(SumList),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            false,
            true,
            ArgsMappingRule::Merge,
        )
        .unwrap();

    let result = automa.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(result, json!(9));
}

#[tokio::test]
async fn unpack_from_dict() {
    let automa = GraphAutoma::new("unpack");
    automa
        .add_worker(
            "A",
            Arc::new(Constant(json!({"x": 10, "y": 20}))),
            vec![],
            true,
            false,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    automa
        .add_worker(
            "B",
            Arc::new(SubtractXY),
            vec!["A".to_string()],
            false,
            true,
            ArgsMappingRule::Unpack,
        )
        .unwrap();

    let result = automa.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(result, json!(-10));
}

#[tokio::test]
async fn ferry_creates_legal_cycle() {
    let automa = GraphAutoma::new("ferry-loop");
    automa
        .add_func_as_worker(
            "A",
            |args, ctx| {
                let count = args.args.first().and_then(|v| v.as_i64()).unwrap_or(0);
                if count < 3 {
                    ctx.ferry_to("A", WorkerArgs::single(json!(count + 1)));
                }
                Ok(json!(count))
            },
            vec![],
            true,
            true,
            ArgsMappingRule::AsIs,
        )
        .unwrap();

    let result = automa
        .run(WorkerArgs::single(json!(0)), vec![])
        .await
        .unwrap();
    assert_eq!(result, json!(3));
}

#[tokio::test]
async fn duplicate_worker_key_is_rejected() {
    let automa = GraphAutoma::new("dup");
    automa
        .add_worker("A", Arc::new(AddN(1)), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    let err = automa
        .add_worker("A", Arc::new(AddN(1)), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap_err();
    assert!(matches!(
        err,
        graphautoma::errors::AutomaError::Runtime(
            graphautoma::errors::RuntimeError::DuplicateAdd { .. }
        )
    ));
}

#[tokio::test]
async fn dangling_dependency_fails_at_run() {
    let automa = GraphAutoma::new("dangling");
    automa
        .add_worker(
            "B",
            Arc::new(AddN(1)),
            vec!["missing".to_string()],
            false,
            true,
            ArgsMappingRule::AsIs,
        )
        .unwrap();

    let err = automa.run(WorkerArgs::new(), vec![]).await.unwrap_err();
    assert!(matches!(
        err,
        graphautoma::errors::AutomaError::Compilation(
            graphautoma::errors::CompilationError::DanglingDependency { .. }
        )
    ));
}
