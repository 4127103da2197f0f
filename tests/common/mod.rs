#![allow(dead_code)]

use std::path::Path;

use bytes::Bytes;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use uuid::Uuid;

use filevault::catalog::{self, NewUpload};
use filevault::error::AppError;
use filevault::models::FileRecord;
use filevault::storage::{LocalStorage, StorageBackend};

pub struct TestStore {
    pub pool: SqlitePool,
    pub storage: StorageBackend,
    // Held so the blob directory outlives the test.
    dir: TempDir,
}

impl TestStore {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

pub async fn setup() -> TestStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let storage = StorageBackend::Local(
        LocalStorage::new(dir.path())
            .await
            .expect("init local storage"),
    );

    // A single connection keeps the whole in-memory database visible to
    // every query in the test.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite");
    sqlx::migrate!().run(&pool).await.expect("run migrations");

    TestStore { pool, storage, dir }
}

pub async fn upload(store: &TestStore, name: &str, bytes: &[u8]) -> FileRecord {
    try_upload(store, name, bytes, None)
        .await
        .expect("upload succeeds")
}

pub async fn upload_duplicate(
    store: &TestStore,
    name: &str,
    bytes: &[u8],
    owner: Uuid,
) -> FileRecord {
    try_upload(store, name, bytes, Some(owner))
        .await
        .expect("duplicate upload succeeds")
}

pub async fn try_upload(
    store: &TestStore,
    name: &str,
    bytes: &[u8],
    duplicate_of: Option<Uuid>,
) -> Result<FileRecord, AppError> {
    catalog::store_upload(
        &store.pool,
        &store.storage,
        NewUpload {
            original_filename: name.to_string(),
            file_type: Some("text/plain".to_string()),
            bytes: Bytes::copy_from_slice(bytes),
            duplicate_of,
        },
    )
    .await
}

pub async fn row_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(pool)
        .await
        .expect("count rows")
}

pub async fn owner_count_for_hash(pool: &SqlitePool, file_hash: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE file_hash = ?1 AND reference_id IS NULL")
        .bind(file_hash)
        .fetch_one(pool)
        .await
        .expect("count owners")
}
