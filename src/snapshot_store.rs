//! Durable storage for [`crate::snapshot::Snapshot`]s, keyed by session id.
//!
//! A small async trait plus an in-memory implementation always available,
//! and a `sqlite`-gated implementation for actual durability across process
//! restarts. Only the latest snapshot per session is retained — a
//! `GraphAutoma`'s suspend/resume cycle only ever needs the most recent
//! one, not a history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::snapshot::{Snapshot, SnapshotError};

#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotStoreError {
    #[error("no snapshot stored for session `{session_id}`")]
    #[diagnostic(code(graphautoma::snapshot_store::not_found))]
    NotFound { session_id: String },

    #[error("snapshot encode/decode error: {0}")]
    #[diagnostic(code(graphautoma::snapshot_store::codec))]
    Codec(#[from] SnapshotError),

    #[error("backend error: {message}")]
    #[diagnostic(code(graphautoma::snapshot_store::backend))]
    Backend { message: String },
}

pub type Result<T> = std::result::Result<T, SnapshotStoreError>;

/// An entry as persisted: the snapshot plus when it was written.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub session_id: String,
    pub snapshot: Snapshot,
    pub saved_at: DateTime<Utc>,
}

/// Durable storage for the latest snapshot per session.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; interior mutability should use
/// `RwLock`/a connection pool rather than unsynchronized state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists `snapshot` as the latest for `session_id`, replacing any
    /// prior one. Idempotent.
    async fn save(&self, session_id: &str, snapshot: &Snapshot) -> Result<()>;

    /// Loads the latest snapshot for `session_id`, or `None` if none exists.
    async fn load_latest(&self, session_id: &str) -> Result<Option<StoredSnapshot>>;

    /// Removes the stored snapshot for `session_id`, if any.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Lists every session id with a stored snapshot.
    async fn list_sessions(&self) -> Result<Vec<String>>;
}

/// Process-local, non-durable `SnapshotStore`. Useful for tests and for
/// hosts that only need suspend/resume within a single process lifetime.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    inner: RwLock<FxHashMap<String, StoredSnapshot>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, session_id: &str, snapshot: &Snapshot) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| SnapshotStoreError::Backend {
                message: format!("lock poisoned: {e}"),
            })?;
        map.insert(
            session_id.to_string(),
            StoredSnapshot {
                session_id: session_id.to_string(),
                snapshot: snapshot.clone(),
                saved_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<StoredSnapshot>> {
        let map = self.inner.read().map_err(|e| SnapshotStoreError::Backend {
            message: format!("lock poisoned: {e}"),
        })?;
        Ok(map.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| SnapshotStoreError::Backend {
                message: format!("lock poisoned: {e}"),
            })?;
        map.remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let map = self.inner.read().map_err(|e| SnapshotStoreError::Backend {
            message: format!("lock poisoned: {e}"),
        })?;
        Ok(map.keys().cloned().collect())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite_impl::SqliteSnapshotStore;

#[cfg(feature = "sqlite")]
mod sqlite_impl {
    use super::{Result, Snapshot, SnapshotStoreError, StoredSnapshot};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::{Row, SqlitePool};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::instrument;

    /// SQLite-backed [`super::SnapshotStore`]. A single `snapshots` table
    /// holding one row per session; `save` is `INSERT OR REPLACE`.
    pub struct SqliteSnapshotStore {
        pool: Arc<SqlitePool>,
    }

    impl std::fmt::Debug for SqliteSnapshotStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SqliteSnapshotStore").finish()
        }
    }

    const CONNECT_ATTEMPTS: u32 = 3;

    impl SqliteSnapshotStore {
        /// Connects to (or creates) a SQLite database at `database_url`,
        /// e.g. `"sqlite://graphautoma.db"`, and ensures the `snapshots`
        /// table exists. Retries the initial connect a few times with
        /// jittered backoff, tolerating a SQLite file that's momentarily
        /// locked by a migration or another process opening it.
        #[instrument(skip(database_url))]
        pub async fn connect(database_url: &str) -> Result<Self> {
            let mut attempt = 0;
            let pool = loop {
                attempt += 1;
                match SqlitePool::connect(database_url).await {
                    Ok(pool) => break pool,
                    Err(e) if attempt < CONNECT_ATTEMPTS => {
                        let jitter_ms = rand::random::<u64>() % 100;
                        let backoff = Duration::from_millis(50 * u64::from(attempt) + jitter_ms);
                        tracing::warn!(attempt, %e, ?backoff, "sqlite connect failed, retrying");
                        tokio::time::sleep(backoff).await;
                    }
                    Err(e) => {
                        return Err(SnapshotStoreError::Backend {
                            message: format!("connect error after {attempt} attempts: {e}"),
                        });
                    }
                }
            };
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS snapshots (
                    session_id TEXT PRIMARY KEY,
                    payload BLOB NOT NULL,
                    saved_at TEXT NOT NULL
                )
                "#,
            )
            .execute(&pool)
            .await
            .map_err(|e| SnapshotStoreError::Backend {
                message: format!("create table: {e}"),
            })?;
            Ok(Self {
                pool: Arc::new(pool),
            })
        }

        /// Loads `DATABASE_URL` via `dotenvy` (falling back to
        /// `sqlite://graphautoma.db` if unset) and connects, so the
        /// connection string can live in a `.env` file instead of the
        /// process environment.
        pub async fn connect_from_env() -> Result<Self> {
            dotenvy::dotenv().ok();
            let database_url = std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://graphautoma.db".to_string());
            Self::connect(&database_url).await
        }
    }

    #[async_trait]
    impl super::SnapshotStore for SqliteSnapshotStore {
        #[instrument(skip(self, snapshot), err)]
        async fn save(&self, session_id: &str, snapshot: &Snapshot) -> Result<()> {
            let payload = snapshot.to_json_bytes()?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO snapshots (session_id, payload, saved_at)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(session_id)
            .bind(payload)
            .bind(Utc::now().to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(|e| SnapshotStoreError::Backend {
                message: format!("insert: {e}"),
            })?;
            Ok(())
        }

        #[instrument(skip(self), err)]
        async fn load_latest(&self, session_id: &str) -> Result<Option<StoredSnapshot>> {
            let row = sqlx::query("SELECT payload, saved_at FROM snapshots WHERE session_id = ?1")
                .bind(session_id)
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| SnapshotStoreError::Backend {
                    message: format!("select: {e}"),
                })?;
            let Some(row) = row else { return Ok(None) };
            let payload: Vec<u8> = row.get("payload");
            let saved_at_str: String = row.get("saved_at");
            let snapshot = Snapshot::from_json_bytes(&payload)?;
            let saved_at = DateTime::parse_from_rfc3339(&saved_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            Ok(Some(StoredSnapshot {
                session_id: session_id.to_string(),
                snapshot,
                saved_at,
            }))
        }

        #[instrument(skip(self), err)]
        async fn delete(&self, session_id: &str) -> Result<()> {
            sqlx::query("DELETE FROM snapshots WHERE session_id = ?1")
                .bind(session_id)
                .execute(&*self.pool)
                .await
                .map_err(|e| SnapshotStoreError::Backend {
                    message: format!("delete: {e}"),
                })?;
            Ok(())
        }

        #[instrument(skip(self), err)]
        async fn list_sessions(&self) -> Result<Vec<String>> {
            let rows = sqlx::query("SELECT session_id FROM snapshots ORDER BY saved_at DESC")
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| SnapshotStoreError::Backend {
                    message: format!("list: {e}"),
                })?;
            Ok(rows
                .into_iter()
                .map(|r| r.get::<String, _>("session_id"))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::automa::GraphAutoma;

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = InMemorySnapshotStore::new();
        let automa = GraphAutoma::new("root");
        let snapshot = automa.to_snapshot();

        assert!(store.load_latest("s1").await.unwrap().is_none());
        store.save("s1", &snapshot).await.unwrap();
        let loaded = store.load_latest("s1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.snapshot.name, "root");

        store.delete("s1").await.unwrap();
        assert!(store.load_latest("s1").await.unwrap().is_none());
    }
}
