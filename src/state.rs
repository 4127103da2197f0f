use sqlx::SqlitePool;
use crate::storage::StorageBackend;
use crate::config::Config;

/// Central application state shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool holding the file catalog.
    pub pool: SqlitePool,

    /// Abstracted blob storage backend (local filesystem or S3).
    pub storage: StorageBackend,

    /// Application configuration loaded from environment variables or `.env`.
    pub config: Config,
}
