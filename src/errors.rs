//! One enum per error category, plus the top-level union a fallible public
//! entry point actually returns.
//!
//! `thiserror` provides the `Display`/`Error` impls, `miette::Diagnostic` a
//! stable `code(...)` and operator-facing `help(...)` on the categories a
//! host is expected to branch on or recover from.

use crate::types::WorkerKey;
use miette::Diagnostic;
use thiserror::Error;

/// Structural violations caught at worker declaration/registration time,
/// before any run has started.
#[derive(Debug, Error, Diagnostic)]
pub enum DeclarationError {
    #[error("duplicate worker key `{key}`")]
    #[diagnostic(
        code(graphautoma::declaration::duplicate_key),
        help("worker keys must be unique within a GraphAutoma; pick a different key or remove the existing worker first")
    )]
    DuplicateKey { key: WorkerKey },

    #[error("worker `{key}` declares a dependency cycle through {via:?}")]
    #[diagnostic(code(graphautoma::declaration::cycle))]
    Cycle { key: WorkerKey, via: Vec<WorkerKey> },

    #[error("unknown args-mapping rule `{rule}` for worker `{key}`")]
    #[diagnostic(
        code(graphautoma::declaration::unknown_rule),
        help("valid rules are as_is, unpack, merge, suppressed")
    )]
    UnknownRule { key: WorkerKey, rule: String },
}

/// Validation failures surfaced on the first call to `run`.
#[derive(Debug, Error, Diagnostic)]
pub enum CompilationError {
    #[error("worker `{key}` depends on unknown worker `{dependency}`")]
    #[diagnostic(code(graphautoma::compilation::dangling_dependency))]
    DanglingDependency {
        key: WorkerKey,
        dependency: WorkerKey,
    },

    #[error("output_worker_key `{key}` does not name a registered worker")]
    #[diagnostic(code(graphautoma::compilation::missing_output_worker))]
    MissingOutputWorker { key: WorkerKey },

    #[error("dependency graph contains a cycle among {cyclic:?}")]
    #[diagnostic(
        code(graphautoma::compilation::cycle),
        help("the listed worker keys could not be topologically ordered; break the cycle via ferry_to instead of a declared dependency")
    )]
    Cycle { cyclic: Vec<WorkerKey> },
}

/// Logical errors raised while a graph is running.
#[derive(Debug, Error, Diagnostic)]
pub enum RuntimeError {
    #[error("worker `{key}` is already registered")]
    #[diagnostic(code(graphautoma::runtime::duplicate_add))]
    DuplicateAdd { key: WorkerKey },

    #[error("cannot remove unknown worker `{key}`")]
    #[diagnostic(code(graphautoma::runtime::remove_unknown))]
    RemoveUnknown { key: WorkerKey },

    #[error("add_dependency references unknown endpoint `{key}`")]
    #[diagnostic(code(graphautoma::runtime::unknown_dependency_endpoint))]
    UnknownDependencyEndpoint { key: WorkerKey },

    #[error("dependency `{dependency}` already declared for `{key}`")]
    #[diagnostic(code(graphautoma::runtime::duplicate_edge))]
    DuplicateEdge {
        key: WorkerKey,
        dependency: WorkerKey,
    },

    #[error("GraphAutoma `{name}` is already running; a run is not re-entrant")]
    #[diagnostic(
        code(graphautoma::runtime::reentrant_run),
        help("await the in-flight run to completion before starting another")
    )]
    ReentrantRun { name: String },

    #[error("request_feedback called from the main loop thread would deadlock")]
    #[diagnostic(
        code(graphautoma::runtime::main_thread_feedback),
        help("use request_feedback_async from cooperative worker code instead")
    )]
    MainThreadFeedback,

    #[error("feedback for worker `{key}` at interaction index {index} has event type `{expected}`, but the stored feedback was recorded for `{actual}`")]
    #[diagnostic(code(graphautoma::runtime::feedback_event_type_mismatch))]
    FeedbackEventTypeMismatch {
        key: WorkerKey,
        index: u64,
        expected: String,
        actual: String,
    },

    #[error("worker `{key}` is not registered")]
    #[diagnostic(code(graphautoma::runtime::unknown_worker))]
    UnknownWorker { key: WorkerKey },

    #[error("feedback request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(graphautoma::runtime::feedback_timeout),
        help("the host's event handler did not reply within the requested timeout")
    )]
    FeedbackTimeout { timeout_ms: u128 },
}

/// Failures mapping predecessor outputs to a worker's next call.
#[derive(Debug, Error, Diagnostic)]
pub enum ArgsMappingError {
    #[error("UNPACK rule on worker `{key}` requires exactly one dependency, found {count}")]
    #[diagnostic(code(graphautoma::args_mapping::unpack_arity))]
    UnpackArity { key: WorkerKey, count: usize },

    #[error("UNPACK rule on worker `{key}` requires a sequence or mapping output, found {found}")]
    #[diagnostic(code(graphautoma::args_mapping::unpack_type))]
    UnpackType { key: WorkerKey, found: &'static str },

    #[error("worker `{key}` cannot accept argument `{name}`: {reason}")]
    #[diagnostic(code(graphautoma::args_mapping::incompatible_shape))]
    IncompatibleShape {
        key: WorkerKey,
        name: String,
        reason: String,
    },
}

/// Violations of the `Worker` contract itself.
#[derive(Debug, Error, Diagnostic)]
pub enum SignatureError {
    #[error("value registered for worker `{key}` does not implement Worker")]
    #[diagnostic(code(graphautoma::signature::not_a_worker))]
    NotAWorker { key: WorkerKey },

    #[error("worker `{key}` is marked is_start but declares dependencies {dependencies:?}")]
    #[diagnostic(
        code(graphautoma::signature::start_worker_has_dependencies),
        help("a start worker must have an empty dependency list; reach it via ferry_to if it also needs to run on-demand")
    )]
    StartWorkerHasDependencies {
        key: WorkerKey,
        dependencies: Vec<WorkerKey>,
    },

    #[error("malformed dependency list for worker `{key}`: {reason}")]
    #[diagnostic(code(graphautoma::signature::malformed_dependency_list))]
    MalformedDependencyList { key: WorkerKey, reason: String },
}

/// The union every fallible public entry point returns.
#[derive(Debug, Error, Diagnostic)]
pub enum AutomaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ArgsMapping(#[from] ArgsMappingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Signature(#[from] SignatureError),

    /// Not a failure: a cooperative suspension for human interaction.
    /// Kept inside the error union because `run` has exactly one `Result`
    /// type and callers already branch on it with `match`/`?`.
    #[error("graph suspended for human interaction ({} pending)", .0.interactions.len())]
    Interaction(#[from] crate::interaction::InteractionException),

    #[error("a worker task failed to join: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Snapshot(#[from] crate::snapshot::SnapshotError),

    /// A worker's own fallible body failed with an opaque error.
    #[error("worker `{key}` failed: {source}")]
    WorkerFailed {
        key: WorkerKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Internal: a non-root GraphAutoma's own step collected interactions.
    /// Never returned to a host directly — the enclosing `Worker::run` impl
    /// for GraphAutoma converts this into `WorkerError::Interact` for its
    /// parent's own S5 accounting. Only a root's `run` raises `Interaction`.
    #[error("graph suspended for human interaction ({} pending, non-root)", .0.len())]
    BubbledInteraction(Vec<crate::interaction::Interaction>),
}

/// The narrower error type a [`crate::worker::Worker::run`] implementation
/// returns: either the worker body failed, argument mapping failed before
/// the body ever ran, or the worker is suspending for human interaction.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Mapping(#[from] ArgsMappingError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Cooperative suspension: the worker (or a nested GraphAutoma it wraps)
    /// surfaced one or more pending interactions.
    #[error("worker requested human interaction")]
    Interact(Vec<crate::interaction::Interaction>),

    #[error(transparent)]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl WorkerError {
    pub fn failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WorkerError::Failed(Box::new(err))
    }
}
