//! Database module for the on-device SQLite store.

mod actions;
mod pool;
mod routes;

pub use actions::*;
pub use pool::*;
pub use routes::*;

/// Errors from the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Fresh migrated store in a temporary directory. Keep the directory alive.
#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, Pool) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("store.db").display());
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    (dir, pool)
}
