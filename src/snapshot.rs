//! Persistent-state capture/restore.
//!
//! `Arc<dyn Worker>` bodies cannot be generically serialized in Rust, so a
//! snapshot only ever covers the *persistent dynamic* half of a
//! [`crate::graph::GraphAutoma`]'s state (see `PersistentState`). Restoring
//! one requires the caller to have already rebuilt the same topology (the
//! same `add_worker` calls, in whatever order) before calling
//! [`crate::graph::GraphAutoma::load_from_snapshot`] — `restore` checks this
//! and refuses to overlay onto a mismatched topology rather than silently
//! dropping state for workers it can no longer find.

use crate::graph::automa::GraphAutoma;
use crate::graph::state::PersistentState;
use crate::types::WorkerKey;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Bumped whenever `PersistentState`'s shape changes in a way that breaks
/// decoding an older snapshot.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A captured, serializable copy of a `GraphAutoma`'s persistent dynamic
/// state, transitively including every nested `GraphAutoma` worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub name: String,
    pub state: PersistentState,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotError {
    #[error("snapshot format version {found} is not supported (expected {expected})")]
    #[diagnostic(
        code(graphautoma::snapshot::version_mismatch),
        help("decode the snapshot with a version of this crate matching the one that captured it")
    )]
    VersionMismatch { found: u32, expected: u32 },

    #[error(
        "snapshot worker set does not match the live topology of `{automa}`: missing {missing:?}, extra {extra:?}"
    )]
    #[diagnostic(
        code(graphautoma::snapshot::topology_mismatch),
        help("load_from_snapshot requires the same add_worker calls to already be in place as when the snapshot was captured")
    )]
    TopologyMismatch {
        automa: String,
        missing: Vec<WorkerKey>,
        extra: Vec<WorkerKey>,
    },

    #[error(
        "worker `{key}` is recorded as a nested GraphAutoma in the snapshot but is not one in the live topology"
    )]
    #[diagnostic(code(graphautoma::snapshot::nested_not_automa))]
    NestedNotAutoma { key: WorkerKey },

    #[error("failed to encode snapshot: {0}")]
    #[diagnostic(code(graphautoma::snapshot::encode))]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode snapshot: {0}")]
    #[diagnostic(code(graphautoma::snapshot::decode))]
    Decode(#[source] serde_json::Error),
}

impl Snapshot {
    /// Captures `automa`'s persistent state, recursing into nested
    /// `GraphAutoma` workers so a root snapshot covers the whole composition
    /// transitively.
    #[must_use]
    pub fn capture(automa: &GraphAutoma) -> Snapshot {
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            name: automa.name(),
            state: capture_local(automa),
        }
    }

    /// Encodes this snapshot as JSON, the wire format `SnapshotStore`
    /// implementations persist.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(SnapshotError::Encode)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
        serde_json::from_slice(bytes).map_err(SnapshotError::Decode)
    }
}

fn capture_local(automa: &GraphAutoma) -> PersistentState {
    let mut state = automa.export_persistent_local();
    for key in automa.all_workers() {
        if let Some(nested) = automa.nested_automa(&key) {
            state.nested.insert(key, capture_local(&nested));
        }
    }
    state
}

/// Overlays `snapshot`'s persistent state onto `automa`, which must already
/// have the same topology registered as when the snapshot was captured.
/// Recurses into nested `GraphAutoma` workers the same way `capture` does.
pub fn restore(automa: &GraphAutoma, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: snapshot.format_version,
            expected: SNAPSHOT_FORMAT_VERSION,
        });
    }
    restore_local(automa, &snapshot.state)
}

fn restore_local(automa: &GraphAutoma, data: &PersistentState) -> Result<(), SnapshotError> {
    check_topology(automa, data)?;
    automa.import_persistent_local(data);
    for (key, nested_data) in &data.nested {
        let nested = automa
            .nested_automa(key)
            .ok_or_else(|| SnapshotError::NestedNotAutoma { key: key.clone() })?;
        restore_local(&nested, nested_data)?;
    }
    Ok(())
}

fn check_topology(automa: &GraphAutoma, data: &PersistentState) -> Result<(), SnapshotError> {
    let live: BTreeSet<WorkerKey> = automa.all_workers().into_iter().collect();
    let snap: BTreeSet<WorkerKey> = data.workers.keys().cloned().collect();
    if live == snap {
        return Ok(());
    }
    Err(SnapshotError::TopologyMismatch {
        automa: automa.name(),
        missing: snap.difference(&live).cloned().collect(),
        extra: live.difference(&snap).cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::CallableWorker;
    use crate::types::ArgsMappingRule;
    use std::sync::Arc;

    fn noop_worker() -> Arc<CallableWorker> {
        Arc::new(CallableWorker::from_sync(|args, _ctx| {
            Ok(args.args.first().cloned().unwrap_or(serde_json::Value::Null))
        }))
    }

    #[test]
    fn round_trips_through_json() {
        let automa = GraphAutoma::new("root");
        automa
            .add_worker("a", noop_worker(), vec![], true, true, ArgsMappingRule::AsIs)
            .unwrap();

        let snapshot = automa.to_snapshot();
        let bytes = snapshot.to_json_bytes().unwrap();
        let decoded = Snapshot::from_json_bytes(&bytes).unwrap();
        assert_eq!(decoded.name, "root");
        assert_eq!(decoded.state.workers.len(), 1);
    }

    #[test]
    fn restore_rejects_topology_mismatch() {
        let source = GraphAutoma::new("root");
        source
            .add_worker("a", noop_worker(), vec![], true, true, ArgsMappingRule::AsIs)
            .unwrap();
        let snapshot = source.to_snapshot();

        let target = GraphAutoma::new("root");
        target
            .add_worker("b", noop_worker(), vec![], true, true, ArgsMappingRule::AsIs)
            .unwrap();

        match target.load_from_snapshot(&snapshot) {
            Err(SnapshotError::TopologyMismatch { .. }) => {}
            _ => panic!("expected a topology mismatch error"),
        }
    }

    #[test]
    fn restore_accepts_matching_topology() {
        let source = GraphAutoma::new("root");
        source
            .add_worker("a", noop_worker(), vec![], true, true, ArgsMappingRule::AsIs)
            .unwrap();
        let snapshot = source.to_snapshot();

        let target = GraphAutoma::new("root");
        target
            .add_worker("a", noop_worker(), vec![], true, true, ArgsMappingRule::AsIs)
            .unwrap();

        assert!(target.load_from_snapshot(&snapshot).is_ok());
    }
}
