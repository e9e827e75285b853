//! The dynamic value and argument representation passed between workers.
//!
//! Workers exchange `serde_json::Value` as their single return type and as
//! the element type of their positional/keyword arguments, which keeps the
//! snapshot codec a pure `serde_json` round-trip with no bespoke wire
//! format of our own.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `(args, kwargs)` pair a worker is invoked with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerArgs {
    pub args: Vec<Value>,
    pub kwargs: FxHashMap<String, Value>,
}

impl WorkerArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: FxHashMap::default(),
        }
    }

    pub fn keyword(kwargs: FxHashMap<String, Value>) -> Self {
        Self {
            args: Vec::new(),
            kwargs,
        }
    }

    pub fn single(value: Value) -> Self {
        Self::positional(vec![value])
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Merge in any keyword not already present — used for the
    /// input-kwargs propagation pass.
    pub fn merge_missing_kwargs(&mut self, extra: &FxHashMap<String, Value>) {
        for (k, v) in extra {
            self.kwargs.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

/// Input to a [`crate::concurrent::ConcurrentGraph`] run: either the same
/// value handed to every registered worker, or a positional pairing of the
/// i-th element with the i-th registered worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum ConcurrentInput {
    Broadcast(Value),
    InOrder(Vec<Value>),
}

/// Classify a value for the UNPACK argument-mapping rule:
/// arrays become positional args, objects become keyword args, anything
/// else is a mapping error at the call site.
pub fn classify_for_unpack(value: &Value) -> UnpackShape {
    match value {
        Value::Array(items) => UnpackShape::Sequence(items.clone()),
        Value::Object(map) => {
            UnpackShape::Mapping(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
        _ => UnpackShape::Invalid,
    }
}

pub enum UnpackShape {
    Sequence(Vec<Value>),
    Mapping(FxHashMap<String, Value>),
    Invalid,
}
