//! Exercises the testable properties enumerated for the scheduler: cycle
//! rejection, at-most-once dispatch, the argument-mapping laws, local-space
//! lifecycle, and interaction-index behavior.

mod common;

use common::{AddN, Constant};
use graphautoma::errors::{AutomaError, CompilationError};
use graphautoma::graph::GraphAutoma;
use graphautoma::interaction::Feedback;
use graphautoma::types::ArgsMappingRule;
use graphautoma::value::WorkerArgs;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn cyclic_dependency_fails_at_run() {
    let automa = GraphAutoma::new("cycle");
    automa
        .add_worker("A", Arc::new(AddN(1)), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    automa
        .add_worker(
            "B",
            Arc::new(AddN(1)),
            vec!["A".to_string()],
            false,
            true,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    // A did not declare a dependency on B at registration, so this is legal
    // to add after the fact; it closes a cycle that only run()'s
    // compilation pass catches.
    automa.add_dependency("A", "B").unwrap();

    let err = automa.run(WorkerArgs::new(), vec![]).await.unwrap_err();
    assert!(matches!(
        err,
        AutomaError::Compilation(CompilationError::Cycle { .. })
    ));
}

#[tokio::test]
async fn diamond_dependency_runs_downstream_worker_exactly_once() {
    let automa = GraphAutoma::new("diamond");
    let calls = Arc::new(AtomicUsize::new(0));

    automa
        .add_worker("A", Arc::new(Constant(json!(1))), vec![], true, false, ArgsMappingRule::AsIs)
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
            vec!["A".to_string()],
            false,
            false,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    {
        let calls = calls.clone();
        automa
            .add_func_as_worker(
                "D",
                move |args, _ctx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let sum: i64 = args.args.iter().filter_map(Value::as_i64).sum();
                    Ok(json!(sum))
                },
                vec!["B".to_string(), "C".to_string()],
                false,
                true,
                ArgsMappingRule::AsIs,
            )
            .unwrap();
    }

    let result = automa.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(result, json!(11 + 101));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn as_is_top_level_kickoff_passes_input_verbatim() {
    let automa = GraphAutoma::new("top-level-args");
    automa
        .add_func_as_worker(
            "A",
            |args, _ctx| {
                Ok(json!({
                    "args": args.args,
                    "kwargs": args.kwargs,
                }))
            },
            vec![],
            true,
            true,
            ArgsMappingRule::AsIs,
        )
        .unwrap();

    let mut kwargs = FxHashMap::default();
    kwargs.insert("k".to_string(), json!(1));
    let input = WorkerArgs {
        args: vec![json!(42)],
        kwargs,
    };

    let result = automa.run(input, vec![]).await.unwrap();
    assert_eq!(result["args"], json!([42]));
    assert_eq!(result["kwargs"]["k"], json!(1));
}

#[tokio::test]
async fn as_is_multiple_dependencies_preserve_declared_order() {
    let automa = GraphAutoma::new("as-is-order");
    automa
        .add_worker("A", Arc::new(Constant(json!("a"))), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    automa
        .add_worker("B", Arc::new(Constant(json!("b"))), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    automa
        .add_worker("C", Arc::new(Constant(json!("c"))), vec![], true, false, ArgsMappingRule::AsIs)
        .unwrap();
    // Declared dependency order is deliberately not registration order.
    automa
        .add_func_as_worker(
            "D",
            |args, _ctx| Ok(Value::Array(args.args)),
            vec!["C".to_string(), "A".to_string(), "B".to_string()],
            false,
            true,
            ArgsMappingRule::AsIs,
        )
        .unwrap();

    let result = automa.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(result, json!(["c", "a", "b"]));
}

#[tokio::test]
async fn unpack_sequence_yields_args_of_matching_length() {
    let automa = GraphAutoma::new("unpack-seq");
    automa
        .add_worker(
            "A",
            Arc::new(Constant(json!([1, 2, 3, 4]))),
            vec![],
            true,
            false,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    automa
        .add_func_as_worker(
            "B",
            |args, _ctx| Ok(json!(args.args.len())),
            vec!["A".to_string()],
            false,
            true,
            ArgsMappingRule::Unpack,
        )
        .unwrap();

    let result = automa.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(result, json!(4));
}

#[tokio::test]
async fn unpack_mapping_yields_kwargs_with_matching_keyset() {
    let automa = GraphAutoma::new("unpack-map");
    automa
        .add_worker(
            "A",
            Arc::new(Constant(json!({"a": 1, "b": 2, "c": 3}))),
            vec![],
            true,
            false,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    automa
        .add_func_as_worker(
            "B",
            |args, _ctx| {
                let mut keys: Vec<String> = args.kwargs.keys().cloned().collect();
                keys.sort();
                Ok(json!(keys))
            },
            vec!["A".to_string()],
            false,
            true,
            ArgsMappingRule::Unpack,
        )
        .unwrap();

    let result = automa.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(result, json!(["a", "b", "c"]));
}

#[tokio::test]
async fn merge_collapses_predecessors_into_one_list_argument() {
    let automa = GraphAutoma::new("merge-arity");
    for (key, value) in [("A", 1), ("B", 2), ("C", 3), ("D", 4)] {
        automa
            .add_worker(key, Arc::new(Constant(json!(value))), vec![], true, false, ArgsMappingRule::AsIs)
            .unwrap();
    }
    automa
        .add_func_as_worker(
            "S",
            |args, _ctx| {
                let list = args.args.first().and_then(Value::as_array).cloned().unwrap_or_default();
                Ok(json!(list.len()))
            },
            vec!["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()],
            false,
            true,
            ArgsMappingRule::Merge,
        )
        .unwrap();

    let result = automa.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(result, json!(4));
}

#[tokio::test]
async fn local_space_is_cleared_by_default_but_preserved_when_opted_out() {
    fn worker(
        _args: WorkerArgs,
        ctx: graphautoma::worker::WorkerContext,
    ) -> Result<Value, graphautoma::errors::WorkerError> {
        let previous = ctx.local_space();
        ctx.set_local_space(json!("touched"));
        Ok(previous)
    }

    let reset_by_default = GraphAutoma::new("reset-default");
    reset_by_default
        .add_func_as_worker("A", worker, vec![], true, true, ArgsMappingRule::AsIs)
        .unwrap();
    let first = reset_by_default.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(first, Value::Null);
    let second = reset_by_default.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(second, Value::Null);

    let preserved = GraphAutoma::new("preserve");
    preserved.set_reset_local_space(false);
    preserved
        .add_func_as_worker("A", worker, vec![], true, true, ArgsMappingRule::AsIs)
        .unwrap();
    let first = preserved.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(first, Value::Null);
    let second = preserved.run(WorkerArgs::new(), vec![]).await.unwrap();
    assert_eq!(second, json!("touched"));
}

#[tokio::test]
async fn interaction_indices_increase_within_a_single_run() {
    fn worker(
        _args: WorkerArgs,
        ctx: graphautoma::worker::WorkerContext,
    ) -> Result<Value, graphautoma::errors::WorkerError> {
        let first = ctx.interact_with_human("conf1", json!({}))?;
        let second = ctx.interact_with_human("conf2", json!({}))?;
        Ok(json!([first.data, second.data]))
    }

    let automa = GraphAutoma::new("indices");
    automa
        .add_func_as_worker("A", worker, vec![], true, true, ArgsMappingRule::AsIs)
        .unwrap();

    let err = automa.run(WorkerArgs::new(), vec![]).await.unwrap_err();
    let exc = match err {
        AutomaError::Interaction(exc) => exc,
        other => panic!("expected Interaction, got {other:?}"),
    };
    assert_eq!(exc.interactions.len(), 1);
    assert_eq!(exc.interactions[0].event.event_type, "conf1");
    let first_id = exc.interactions[0].interaction_id.clone();

    let err2 = automa
        .run(
            WorkerArgs::new(),
            vec![Feedback {
                interaction_id: first_id,
                data: json!("a"),
            }],
        )
        .await
        .unwrap_err();
    let exc2 = match err2 {
        AutomaError::Interaction(exc2) => exc2,
        other => panic!("expected Interaction, got {other:?}"),
    };
    assert_eq!(exc2.interactions.len(), 1);
    assert_eq!(exc2.interactions[0].event.event_type, "conf2");
    let second_id = exc2.interactions[0].interaction_id.clone();

    let result = automa
        .run(
            WorkerArgs::new(),
            vec![Feedback {
                interaction_id: second_id,
                data: json!("b"),
            }],
        )
        .await
        .unwrap();
    assert_eq!(result, json!(["a", "b"]));
}

#[tokio::test]
async fn ferry_resets_interaction_index_for_the_same_worker() {
    fn worker(
        args: WorkerArgs,
        ctx: graphautoma::worker::WorkerContext,
    ) -> Result<Value, graphautoma::errors::WorkerError> {
        let round = args.args.first().and_then(Value::as_i64).unwrap_or(0);
        let feedback = ctx.interact_with_human("step", json!({ "round": round }))?;
        if round == 0 {
            ctx.ferry_to("A", WorkerArgs::single(json!(1)));
        }
        Ok(feedback.data)
    }

    let automa = GraphAutoma::new("ferry-reset");
    automa
        .add_func_as_worker("A", worker, vec![], true, true, ArgsMappingRule::AsIs)
        .unwrap();

    let err = automa
        .run(WorkerArgs::single(json!(0)), vec![])
        .await
        .unwrap_err();
    let exc = match err {
        AutomaError::Interaction(exc) => exc,
        other => panic!("expected Interaction, got {other:?}"),
    };
    let first_id = exc.interactions[0].interaction_id.clone();

    let err2 = automa
        .run(
            WorkerArgs::new(),
            vec![Feedback {
                interaction_id: first_id,
                data: json!("round-zero"),
            }],
        )
        .await
        .unwrap_err();
    let exc2 = match err2 {
        AutomaError::Interaction(exc2) => exc2,
        other => panic!("expected Interaction, got {other:?}"),
    };
    // The ferried re-run's interact_with_human call lands at index 0 again,
    // so it is a fresh interaction rather than a continuation of the first.
    let second_id = exc2.interactions[0].interaction_id.clone();
    assert_ne!(second_id, "".to_string());

    let result = automa
        .run(
            WorkerArgs::new(),
            vec![Feedback {
                interaction_id: second_id,
                data: json!("round-one"),
            }],
        )
        .await
        .unwrap();
    assert_eq!(result, json!("round-one"));
}
