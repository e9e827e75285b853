use graphautoma::errors::AutomaError;
use graphautoma::graph::GraphAutoma;
use graphautoma::interaction::Feedback;
use graphautoma::types::ArgsMappingRule;
use graphautoma::value::WorkerArgs;
use graphautoma::worker::WorkerContext;
use serde_json::{json, Value};
use std::sync::Arc;

fn confirm_worker(
    _args: WorkerArgs,
    ctx: WorkerContext,
) -> Result<Value, graphautoma::errors::WorkerError> {
    let feedback = ctx.interact_with_human("confirm", json!({}))?;
    let answer = feedback.data.as_str().unwrap_or_default().to_string();
    Ok(json!(format!("confirmed:{answer}")))
}

fn build_single_interaction_graph() -> GraphAutoma {
    let automa = GraphAutoma::new("interact");
    automa
        .add_func_as_worker("A", confirm_worker, vec![], true, true, ArgsMappingRule::AsIs)
        .unwrap();
    automa
}

#[tokio::test]
async fn human_interaction_round_trip() {
    let automa = build_single_interaction_graph();
    let err = automa.run(WorkerArgs::new(), vec![]).await.unwrap_err();
    let exc = match err {
        AutomaError::Interaction(exc) => exc,
        other => panic!("expected Interaction, got {other:?}"),
    };
    assert_eq!(exc.interactions.len(), 1);
    let interaction_id = exc.interactions[0].interaction_id.clone();
    let snapshot = exc.snapshot.clone();

    let resumed = build_single_interaction_graph()
        .load_from_snapshot(&snapshot)
        .unwrap();
    let feedback = Feedback {
        interaction_id: interaction_id.clone(),
        data: json!("yes"),
    };
    let result = resumed
        .run(WorkerArgs::new(), vec![feedback])
        .await
        .unwrap();
    assert_eq!(result, json!("confirmed:yes"));
}

#[tokio::test]
async fn reloading_without_feedback_surfaces_same_interaction_id() {
    let automa = build_single_interaction_graph();
    let err = automa.run(WorkerArgs::new(), vec![]).await.unwrap_err();
    let exc = match err {
        AutomaError::Interaction(exc) => exc,
        other => panic!("expected Interaction, got {other:?}"),
    };
    let interaction_id = exc.interactions[0].interaction_id.clone();

    let resumed = build_single_interaction_graph()
        .load_from_snapshot(&exc.snapshot)
        .unwrap();
    let err2 = resumed.run(WorkerArgs::new(), vec![]).await.unwrap_err();
    let exc2 = match err2 {
        AutomaError::Interaction(exc2) => exc2,
        other => panic!("expected Interaction, got {other:?}"),
    };
    assert_eq!(exc2.interactions.len(), 1);
    assert_eq!(exc2.interactions[0].interaction_id, interaction_id);
}

fn branch_worker(
    event_type: &'static str,
) -> impl Fn(WorkerArgs, WorkerContext) -> Result<Value, graphautoma::errors::WorkerError>
       + Send
       + Sync
       + 'static {
    move |_args, ctx| {
        let feedback = ctx.interact_with_human(event_type, json!({}))?;
        Ok(json!(feedback.data.as_i64().unwrap_or(0)))
    }
}

fn sum_two(
    args: WorkerArgs,
    _ctx: WorkerContext,
) -> Result<Value, graphautoma::errors::WorkerError> {
    let list = args.args.first().and_then(Value::as_array).cloned().unwrap_or_default();
    let sum: i64 = list.iter().filter_map(Value::as_i64).sum();
    Ok(json!(sum))
}

fn build_nested_graph() -> GraphAutoma {
    let nested = GraphAutoma::new("branches");
    nested
        .add_func_as_worker(
            "branch1",
            branch_worker("b1"),
            vec![],
            true,
            false,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    nested
        .add_func_as_worker(
            "branch2",
            branch_worker("b2"),
            vec![],
            true,
            false,
            ArgsMappingRule::AsIs,
        )
        .unwrap();
    nested
        .add_func_as_worker(
            "combine",
            sum_two,
            vec!["branch1".to_string(), "branch2".to_string()],
            false,
            true,
            ArgsMappingRule::Merge,
        )
        .unwrap();

    let root = GraphAutoma::new("root");
    root.add_worker("G", Arc::new(nested), vec![], true, true, ArgsMappingRule::AsIs)
        .unwrap();
    root
}

#[tokio::test]
async fn nested_automa_parallel_interaction_branches() {
    let root = build_nested_graph();
    let err = root.run(WorkerArgs::new(), vec![]).await.unwrap_err();
    let exc = match err {
        AutomaError::Interaction(exc) => exc,
        other => panic!("expected Interaction, got {other:?}"),
    };
    assert_eq!(exc.interactions.len(), 2);

    let ids: Vec<String> = exc
        .interactions
        .iter()
        .map(|i| i.interaction_id.clone())
        .collect();
    let event_types: Vec<String> = exc
        .interactions
        .iter()
        .map(|i| i.event.event_type.clone())
        .collect();
    assert!(event_types.contains(&"b1".to_string()));
    assert!(event_types.contains(&"b2".to_string()));

    let feedbacks_forward = vec![
        Feedback {
            interaction_id: ids[0].clone(),
            data: json!(2),
        },
        Feedback {
            interaction_id: ids[1].clone(),
            data: json!(5),
        },
    ];
    let resumed_forward = build_nested_graph()
        .load_from_snapshot(&exc.snapshot)
        .unwrap();
    let result_forward = resumed_forward
        .run(WorkerArgs::new(), feedbacks_forward)
        .await
        .unwrap();
    assert_eq!(result_forward, json!(7));

    let feedbacks_reversed = vec![
        Feedback {
            interaction_id: ids[1].clone(),
            data: json!(5),
        },
        Feedback {
            interaction_id: ids[0].clone(),
            data: json!(2),
        },
    ];
    let resumed_reversed = build_nested_graph()
        .load_from_snapshot(&exc.snapshot)
        .unwrap();
    let result_reversed = resumed_reversed
        .run(WorkerArgs::new(), feedbacks_reversed)
        .await
        .unwrap();
    assert_eq!(result_reversed, json!(7));
}
