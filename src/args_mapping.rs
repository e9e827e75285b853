//! Argument-mapping rules across edges.

use crate::errors::ArgsMappingError;
use crate::types::{ArgsMappingRule, WorkerKey};
use crate::value::{classify_for_unpack, UnpackShape, WorkerArgs};
use crate::worker::ParameterKinds;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// Apply an args-mapping rule for worker `key` given its declared
/// dependencies (in order) and the current output buffer.
///
/// `last_kickoff_output` is the single predecessor's output under UNPACK —
/// passed separately because UNPACK keys off `last_kickoff`, not the full
/// dependency list.
pub fn map_args(
    key: &WorkerKey,
    rule: ArgsMappingRule,
    dependencies: &[WorkerKey],
    output_buffer: &indexmap::IndexMap<WorkerKey, Value>,
    last_kickoff_output: Option<&Value>,
) -> Result<WorkerArgs, ArgsMappingError> {
    match rule {
        ArgsMappingRule::AsIs => {
            let args = dependencies
                .iter()
                .map(|d| output_buffer.get(d).cloned().unwrap_or(Value::Null))
                .collect();
            Ok(WorkerArgs::positional(args))
        }
        ArgsMappingRule::Unpack => {
            if dependencies.len() != 1 {
                return Err(ArgsMappingError::UnpackArity {
                    key: key.clone(),
                    count: dependencies.len(),
                });
            }
            let v = last_kickoff_output.cloned().unwrap_or(Value::Null);
            match classify_for_unpack(&v) {
                UnpackShape::Sequence(items) => Ok(WorkerArgs::positional(items)),
                UnpackShape::Mapping(map) => Ok(WorkerArgs::keyword(map)),
                UnpackShape::Invalid => Err(ArgsMappingError::UnpackType {
                    key: key.clone(),
                    found: json_type_name(&v),
                }),
            }
        }
        ArgsMappingRule::Merge => {
            let merged: Vec<Value> = dependencies
                .iter()
                .map(|d| output_buffer.get(d).cloned().unwrap_or(Value::Null))
                .collect();
            Ok(WorkerArgs::positional(vec![Value::Array(merged)]))
        }
        ArgsMappingRule::Suppressed => Ok(WorkerArgs::new()),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Input-kwargs propagation + `safely_map_args`: merge any top-level
/// keyword not already present, then drop or reject according to the
/// target's parameter kinds.
pub fn propagate_and_check(
    key: &WorkerKey,
    mut args: WorkerArgs,
    top_level_kwargs: &FxHashMap<String, Value>,
    parameter_kinds: &ParameterKinds,
) -> Result<WorkerArgs, ArgsMappingError> {
    args.merge_missing_kwargs(top_level_kwargs);
    safely_map_args(key, args, parameter_kinds)
}

/// Drop kwargs the target cannot accept unless it declares var-keyword;
/// reject positional overflow unless it declares var-positional.
pub fn safely_map_args(
    key: &WorkerKey,
    args: WorkerArgs,
    parameter_kinds: &ParameterKinds,
) -> Result<WorkerArgs, ArgsMappingError> {
    let max_positional =
        parameter_kinds.positional_only.len() + parameter_kinds.positional_or_keyword.len();
    if args.args.len() > max_positional && !parameter_kinds.accepts_extra_positional() {
        return Err(ArgsMappingError::IncompatibleShape {
            key: key.clone(),
            name: "<positional>".to_string(),
            reason: format!(
                "worker accepts at most {max_positional} positional argument(s), got {}",
                args.args.len()
            ),
        });
    }

    if parameter_kinds.var_keyword.is_some() {
        return Ok(args);
    }

    let mut kept = FxHashMap::default();
    for (name, value) in args.kwargs {
        if parameter_kinds.accepts_keyword(&name) {
            kept.insert(name, value);
        }
        // Silently dropped otherwise, rather than rejected: a worker without
        // var-keyword simply ignores extra keywords it wasn't declared for.
    }
    Ok(WorkerArgs {
        args: args.args,
        kwargs: kept,
    })
}
