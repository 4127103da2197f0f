//! The file catalog: content-addressed dedup over the blob store.
//!
//! Every logical upload gets one `files` row. The first upload of a given
//! content hash owns the blob; later identical uploads, once confirmed by the
//! client through the duplicate pre-check, become reference rows that share
//! the owner's blob. Uploads run hash lookup, row insert and blob write inside
//! one transaction, and a partial unique index on owner hashes keeps
//! at-most-one-owner true under concurrent identical uploads.

use bytes::Bytes;
use chrono::{NaiveTime, TimeDelta, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, is_unique_violation},
    models::{DuplicateCheck, FilePage, FileQuery, FileRecord},
    storage::{Storage, StorageBackend},
    utils::{blob_key, calculate_sha256, escape_like},
};

const SELECT_COLUMNS: &str =
    "id, original_filename, file_type, size, file_hash, uploaded_at, reference_id";

const SUGGEST_MIN_LENGTH: usize = 3;
const SUGGEST_LIMIT: i64 = 10;

/// A single upload request after multipart parsing.
#[derive(Debug)]
pub struct NewUpload {
    pub original_filename: String,
    pub file_type: Option<String>,
    pub bytes: Bytes,
    /// Owner id the client confirmed through the duplicate pre-check. Always
    /// revalidated against the current owner of the uploaded content, so a
    /// stale id left over from a previous file selection never links a record
    /// to unrelated content.
    pub duplicate_of: Option<Uuid>,
}

/// Look up the owning record for a content hash, if any.
async fn find_owner<'e, E>(executor: E, file_hash: &str) -> Result<Option<FileRecord>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, FileRecord>(&format!(
        "SELECT {SELECT_COLUMNS} FROM files WHERE file_hash = ?1 AND reference_id IS NULL"
    ))
    .bind(file_hash)
    .fetch_optional(executor)
    .await
}

async fn insert_record<'e, E>(executor: E, record: &FileRecord) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO files (id, original_filename, file_type, size, file_hash, uploaded_at, reference_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(record.id)
    .bind(&record.original_filename)
    .bind(&record.file_type)
    .bind(record.size)
    .bind(&record.file_hash)
    .bind(record.uploaded_at)
    .bind(record.reference_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Duplicate pre-check: pure read, no side effects. Used by the client to
/// prompt before committing an upload.
pub async fn check_duplicate(pool: &SqlitePool, bytes: &[u8]) -> Result<DuplicateCheck, AppError> {
    let file_hash = calculate_sha256(bytes);
    let owner = find_owner(pool, &file_hash).await?;
    Ok(match owner {
        Some(owner) => DuplicateCheck {
            exists: true,
            id: Some(owner.id),
        },
        None => DuplicateCheck {
            exists: false,
            id: None,
        },
    })
}

/// Run the upload protocol for one request.
///
/// Hash lookup, catalog insert and blob write happen inside one transaction:
/// a storage failure rolls the insert back, so no record ever points at
/// missing bytes and no half-finished upload is discoverable as existing
/// content. The blob key is derived from the hash, so a crash after the blob
/// write but before commit leaves at worst an orphan blob that the next
/// identical upload replaces in place.
pub async fn store_upload(
    pool: &SqlitePool,
    storage: &StorageBackend,
    upload: NewUpload,
) -> Result<FileRecord, AppError> {
    let file_hash = calculate_sha256(&upload.bytes);
    let size = upload.bytes.len() as i64;
    let file_type = upload
        .file_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            mime_guess::from_path(&upload.original_filename)
                .first_or_octet_stream()
                .to_string()
        });

    let mut tx = pool.begin().await?;
    let owner = find_owner(&mut *tx, &file_hash).await?;

    let record = match (owner, upload.duplicate_of) {
        (Some(owner), Some(claimed)) => {
            // The confirmation must name the current owner of these exact
            // bytes; an id left over from a different pre-check is refused.
            if claimed != owner.id {
                return Err(AppError::Conflict(format!(
                    "duplicate reference target {} does not match the current owner {}",
                    claimed, owner.id
                )));
            }
            // Confirmed duplicate: new catalog row sharing the owner's blob.
            // file_type, size and hash are copied from the owner; the bytes
            // are not written again.
            let record = FileRecord {
                id: Uuid::new_v4(),
                original_filename: upload.original_filename,
                file_type: owner.file_type.clone(),
                size: owner.size,
                file_hash: owner.file_hash.clone(),
                uploaded_at: Utc::now(),
                reference_id: Some(owner.id),
            };
            insert_record(&mut *tx, &record).await?;
            info!(
                "Duplicate upload linked: {} -> {} ({} bytes saved)",
                record.id, owner.id, owner.size
            );
            record
        }
        (Some(owner), None) => {
            return Err(AppError::Conflict(format!(
                "identical content already stored as {}; re-submit with its id to confirm a duplicate upload",
                owner.id
            )));
        }
        (None, Some(claimed)) => {
            // The confirmation is stale: the owner was deleted since the
            // pre-check, or the check was run against a different file.
            return Err(AppError::Conflict(format!(
                "duplicate reference target {} does not match the uploaded content",
                claimed
            )));
        }
        (None, None) => {
            let record = FileRecord {
                id: Uuid::new_v4(),
                original_filename: upload.original_filename,
                file_type,
                size,
                file_hash: file_hash.clone(),
                uploaded_at: Utc::now(),
                reference_id: None,
            };
            insert_record(&mut *tx, &record).await.map_err(|err| {
                if is_unique_violation(&err) {
                    AppError::Conflict(
                        "identical content was stored concurrently; re-run the duplicate check"
                            .to_string(),
                    )
                } else {
                    AppError::DatabaseError(err)
                }
            })?;
            storage.put(&blob_key(&file_hash), upload.bytes).await?;
            info!("File stored: {} ({} bytes, hash {})", record.id, size, file_hash);
            record
        }
    };

    tx.commit().await?;
    Ok(record)
}

/// Fetch a single record by id.
pub async fn get_record(pool: &SqlitePool, id: Uuid) -> Result<FileRecord, AppError> {
    sqlx::query_as::<_, FileRecord>(&format!("SELECT {SELECT_COLUMNS} FROM files WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))
}

/// Resolve a record and fetch the bytes of the blob it shares. References
/// resolve through `file_hash` to the same blob as their owner.
pub async fn load_blob(
    pool: &SqlitePool,
    storage: &StorageBackend,
    id: Uuid,
) -> Result<(FileRecord, Bytes), AppError> {
    let record = get_record(pool, id).await?;
    let content = storage.get(&blob_key(&record.file_hash)).await?;
    Ok((record, content))
}

/// Delete a catalog record.
///
/// Reference rows only remove themselves. Owner rows are refused while any
/// reference still points at them (never reassigned, never silently cascaded).
/// For an owner with no references, the row delete and the blob delete share
/// one transaction: a blob failure rolls the row back, and the write lock held
/// until commit keeps a concurrent identical upload from re-creating the
/// content-addressed blob before this delete is done with it. Either way a
/// committed catalog never holds a record pointing at deleted bytes.
pub async fn delete_record(
    pool: &SqlitePool,
    storage: &StorageBackend,
    id: Uuid,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, FileRecord>(&format!(
        "SELECT {SELECT_COLUMNS} FROM files WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if record.reference_id.is_some() {
        // Reference rows share someone else's blob; only the row goes.
        sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Reference record deleted: {}", id);
        return Ok(());
    }

    let references: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM files WHERE reference_id = ?1")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
    if !references.is_empty() {
        let ids = references
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AppError::Conflict(format!(
            "file owns content still referenced by {} record(s): {}",
            references.len(),
            ids
        )));
    }

    sqlx::query("DELETE FROM files WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    storage.delete(&blob_key(&record.file_hash)).await?;
    tx.commit().await?;

    info!("File and blob deleted: {}", id);
    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &FileQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(name) = &query.name {
        builder.push(" AND original_filename LIKE ");
        builder.push_bind(format!("%{}%", escape_like(name)));
        builder.push(" ESCAPE '\\'");
    }
    if let Some(file_type) = &query.file_type {
        builder.push(" AND file_type = ");
        builder.push_bind(file_type.clone());
        builder.push(" COLLATE NOCASE");
    }
    if let Some(min) = query.min_size {
        builder.push(" AND size >= ");
        builder.push_bind(min);
    }
    if let Some(max) = query.max_size {
        builder.push(" AND size <= ");
        builder.push_bind(max);
    }
    if let Some(from) = query.from_date {
        builder.push(" AND uploaded_at >= ");
        builder.push_bind(from.and_time(NaiveTime::MIN).and_utc());
    }
    if let Some(to) = query.to_date {
        // Inclusive end-of-day bound.
        builder.push(" AND uploaded_at < ");
        builder.push_bind(to.and_time(NaiveTime::MIN).and_utc() + TimeDelta::days(1));
    }
}

/// Filtered, paginated listing. Ordered by `uploaded_at DESC, id DESC`: the
/// tiebreak keeps the sort deterministic so page concatenation over a fixed
/// dataset covers the filtered set exactly once.
pub async fn query_files(pool: &SqlitePool, query: &FileQuery) -> Result<FilePage, AppError> {
    let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM files");
    push_filters(&mut count_builder, query);
    let count: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

    let total_pages = if count == 0 {
        0
    } else {
        (count + query.page_size - 1) / query.page_size
    };

    let records = if query.page <= total_pages {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {SELECT_COLUMNS} FROM files"));
        push_filters(&mut builder, query);
        builder.push(" ORDER BY uploaded_at DESC, id DESC LIMIT ");
        builder.push_bind(query.page_size);
        builder.push(" OFFSET ");
        builder.push_bind((query.page - 1) * query.page_size);
        builder
            .build_query_as::<FileRecord>()
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    Ok(FilePage {
        result: records.into_iter().map(FileRecord::into_body).collect(),
        count,
        total_pages,
        current_page: query.page,
        page_size: query.page_size,
        has_next: query.page < total_pages,
        has_previous: query.page > 1,
    })
}

/// Filename autocomplete: distinct names containing the query, prefix matches
/// ranked first, then most recent upload. Queries shorter than three
/// characters return nothing.
pub async fn suggest_filenames(pool: &SqlitePool, query: &str) -> Result<Vec<String>, AppError> {
    let query = query.trim();
    if query.chars().count() < SUGGEST_MIN_LENGTH {
        return Ok(Vec::new());
    }

    let escaped = escape_like(query);
    let names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT original_filename FROM files
        WHERE original_filename LIKE ?1 ESCAPE '\'
        GROUP BY original_filename
        ORDER BY (original_filename LIKE ?2 ESCAPE '\') DESC, MAX(uploaded_at) DESC
        LIMIT ?3
        "#,
    )
    .bind(format!("%{escaped}%"))
    .bind(format!("{escaped}%"))
    .bind(SUGGEST_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Distinct MIME types present in the catalog, sorted.
pub async fn list_mime_types(pool: &SqlitePool) -> Result<Vec<String>, AppError> {
    let types = sqlx::query_scalar("SELECT DISTINCT file_type FROM files ORDER BY file_type")
        .fetch_all(pool)
        .await?;
    Ok(types)
}
