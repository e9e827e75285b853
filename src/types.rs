//! Core scalar types shared across the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a worker within a single [`crate::graph::GraphAutoma`].
///
/// Plain `String` wrapped in a type alias rather than a newtype: keys are
/// supplied by callers as ordinary strings at every public entry point
/// (`add_worker`, `add_dependency`, `ferry_to`, ...), and a newtype would only
/// add `.as_str()` noise at each call site without buying extra safety.
pub type WorkerKey = String;

/// The sentinel `last_kickoff` value for a worker fired directly by the
/// top-level `run` call, as opposed to a predecessor's key or a ferry.
pub const AUTOMA_KICKOFF: &str = "__AUTOMA__";

/// Policy translating a worker's predecessor outputs into its next call's
/// arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgsMappingRule {
    /// One positional argument per dependency, in declared order.
    AsIs,
    /// The single predecessor's output is unpacked: a sequence becomes
    /// positional args, a mapping becomes keyword args.
    Unpack,
    /// All predecessor outputs collapse into a single positional list
    /// argument.
    Merge,
    /// No arguments are derived from predecessors; the worker reads the
    /// output buffer itself.
    Suppressed,
}

impl Default for ArgsMappingRule {
    fn default() -> Self {
        ArgsMappingRule::AsIs
    }
}

impl fmt::Display for ArgsMappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgsMappingRule::AsIs => "as_is",
            ArgsMappingRule::Unpack => "unpack",
            ArgsMappingRule::Merge => "merge",
            ArgsMappingRule::Suppressed => "suppressed",
        };
        f.write_str(s)
    }
}

/// Where a kickoff's arguments came from — drives both argument mapping and
/// the scheduler's dedup/ordering rules for a step's next wavefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastKickoff {
    /// Fired by the graph's own top-level `run` call.
    Automa,
    /// Fired because predecessor `key` just finished.
    Worker(WorkerKey),
}

impl LastKickoff {
    pub fn as_worker_key(&self) -> Option<&str> {
        match self {
            LastKickoff::Automa => None,
            LastKickoff::Worker(k) => Some(k.as_str()),
        }
    }
}

impl fmt::Display for LastKickoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastKickoff::Automa => f.write_str(AUTOMA_KICKOFF),
            LastKickoff::Worker(k) => f.write_str(k),
        }
    }
}
