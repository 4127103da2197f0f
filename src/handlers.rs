use axum::{Json, extract::{Multipart, Path, Query, State}, http::{StatusCode, header}, response::Response};
use bytes::Bytes;
use tracing::error;
use uuid::Uuid;

use crate::{
    catalog::{self, NewUpload},
    error::AppError,
    models::{DuplicateCheck, FileBody, FilePage, ListParams, SuggestParams, FileQuery},
    state::AppState,
};

/// Parsed multipart upload form: the `file` part plus the optional `id` text
/// field carrying a confirmed duplicate owner.
#[derive(Debug, Default)]
struct UploadForm {
    bytes: Option<Bytes>,
    filename: Option<String>,
    content_type: Option<String>,
    duplicate_of: Option<Uuid>,
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Error parsing multipart: {}", e);
        AppError::MultipartError(format!("Failed to parse multipart form: {}", e))
    })? {
        match field.name().unwrap_or("") {
            "file" => {
                form.filename = field.file_name().map(|s| s.to_string());
                form.content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| {
                    error!("Error reading file bytes: {}", e);
                    AppError::MultipartError(format!("Failed to read the file: {}", e))
                })?;
                form.bytes = Some(data);
            }
            "id" => {
                let text = field.text().await.map_err(|e| {
                    AppError::MultipartError(format!("Failed to read the id field: {}", e))
                })?;
                let text = text.trim();
                if !text.is_empty() {
                    let id = Uuid::parse_str(text).map_err(|_| {
                        AppError::BadRequest(format!("Invalid reference id: {}", text))
                    })?;
                    form.duplicate_of = Some(id);
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Upload a file using multipart/form-data. An `id` field marks the upload as
/// a client-confirmed duplicate of that record.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileBody>), AppError> {
    let form = read_upload_form(&mut multipart).await?;

    let bytes = form
        .bytes
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    let original_filename = form
        .filename
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    if bytes.len() as u64 > state.config.max_file_size {
        error!(
            "File size {} exceeds maximum limit of {} bytes",
            bytes.len(),
            state.config.max_file_size
        );
        return Err(AppError::PayloadTooLarge(format!(
            "File size {} exceeds maximum limit of {} bytes",
            bytes.len(),
            state.config.max_file_size
        )));
    }

    let record = catalog::store_upload(
        &state.pool,
        &state.storage,
        NewUpload {
            original_filename,
            file_type: form.content_type,
            bytes,
            duplicate_of: form.duplicate_of,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record.into_body())))
}

/// Duplicate pre-check: hash the submitted file and report the owning record,
/// if any. Never creates anything.
pub async fn check_duplicate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DuplicateCheck>, AppError> {
    let form = read_upload_form(&mut multipart).await?;
    let bytes = form
        .bytes
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let check = catalog::check_duplicate(&state.pool, &bytes).await?;
    Ok(Json(check))
}

/// Filtered, paginated file listing.
pub async fn list_files(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<FilePage>, AppError> {
    let query = FileQuery::try_from(params)?;
    let page = catalog::query_files(&state.pool, &query).await?;
    Ok(Json(page))
}

/// Filename autocomplete.
pub async fn suggest_filenames(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<Vec<String>>, AppError> {
    let names = catalog::suggest_filenames(&state.pool, &params.q).await?;
    Ok(Json(names))
}

/// List the distinct MIME types known to the catalog.
pub async fn list_mime_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, AppError> {
    let types = catalog::list_mime_types(&state.pool).await?;
    Ok(Json(types))
}

/// Download a file by its record id. References resolve to the blob owned by
/// their target, so the same bytes come back for every record sharing a hash.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (record, content) = catalog::load_blob(&state.pool, &state.storage, id).await?;

    // Create HTTP response with binary body
    let mut response = Response::new(content.into());

    // Set Content-Type header so the browser knows the file type
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_str(&record.file_type)
            .unwrap_or_else(|_| header::HeaderValue::from_static("application/octet-stream")),
    );

    // Set Content-Disposition header to force download
    // and preserve the original filename
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        header::HeaderValue::from_str(&format!(
            "attachment; filename=\"{}\"",
            record.original_filename
        ))
        .unwrap_or_else(|_| header::HeaderValue::from_static("attachment")),
    );

    Ok(response)
}

/// Delete a file record; owners with live references are refused with a
/// conflict naming the blockers.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    catalog::delete_record(&state.pool, &state.storage, id).await?;

    // 204 No Content indicates successful deletion with no response body
    Ok(StatusCode::NO_CONTENT)
}
