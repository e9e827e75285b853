//! GraphAutoma and its supporting machinery.

pub mod automa;
pub mod record;
pub mod state;
pub mod validate;

pub use automa::{EventHandler, GraphAutoma, PendingAddWorker, WorkerPool};
pub use record::{GraphWorker, WorkerCallback};

#[cfg(feature = "petgraph-compat")]
pub use validate::petgraph_compat;
