use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// One catalog row per logical upload.
///
/// The first upload of a given content becomes the owner (`reference_id` is
/// NULL) and the only row for which a blob is physically written. Confirmed
/// duplicate uploads get their own row with `reference_id` pointing at the
/// owner; `size`, `file_type` and `file_hash` are copied from the owner so
/// storage-saved reporting never has to re-read the blob.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub original_filename: String,
    pub file_type: String,
    pub size: i64,
    pub file_hash: String,
    pub uploaded_at: DateTime<Utc>,
    pub reference_id: Option<Uuid>,
}

impl FileRecord {
    /// API body shape: the record plus its resolvable download reference.
    /// Owners and references resolve through `file_hash` to the same blob.
    pub fn into_body(self) -> FileBody {
        FileBody {
            file: format!("/files/{}/download", self.id),
            id: self.id,
            original_filename: self.original_filename,
            file_type: self.file_type,
            size: self.size,
            file_hash: self.file_hash,
            uploaded_at: self.uploaded_at,
            reference_id: self.reference_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileBody {
    pub id: Uuid,
    pub original_filename: String,
    pub file_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
    pub file: String,
    pub file_hash: String,
    pub reference_id: Option<Uuid>,
}

/// Paginated listing envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct FilePage {
    pub result: Vec<FileBody>,
    pub count: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Duplicate pre-check result: the current owner of the content, if any.
#[derive(Debug, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

/// Raw listing query string. Everything arrives as optional strings because
/// the client sends empty values for untouched filter fields.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    #[serde(rename = "startSize")]
    pub start_size: Option<String>,
    #[serde(rename = "endSize")]
    pub end_size: Option<String>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub q: String,
}

/// Validated listing query. All filters are conjunctive; unset bounds are
/// unbounded on that side.
#[derive(Debug, Clone)]
pub struct FileQuery {
    pub name: Option<String>,
    pub file_type: Option<String>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub page: i64,
    pub page_size: i64,
}

impl TryFrom<ListParams> for FileQuery {
    type Error = AppError;

    fn try_from(params: ListParams) -> Result<Self, AppError> {
        let name = normalize(params.name);
        let file_type = normalize(params.file_type);

        let min_size = parse_size(params.start_size, "startSize")?;
        let max_size = parse_size(params.end_size, "endSize")?;
        // The client sends 0/0 when the size fields were left untouched;
        // treat that as "no size filter".
        let (min_size, max_size) = match (min_size, max_size) {
            (Some(0), Some(0)) => (None, None),
            bounds => bounds,
        };
        if let (Some(min), Some(max)) = (min_size, max_size) {
            if min > max {
                return Err(AppError::BadRequest(
                    "startSize must not exceed endSize".to_string(),
                ));
            }
        }

        let from_date = parse_date(params.start_date, "startDate")?;
        let to_date = parse_date(params.end_date, "endDate")?;
        if let (Some(from), Some(to)) = (from_date, to_date) {
            if from > to {
                return Err(AppError::BadRequest(
                    "startDate must not exceed endDate".to_string(),
                ));
            }
        }

        let page = parse_positive(params.page, "page", 1)?;
        let page_size = parse_positive(params.page_size, "pageSize", DEFAULT_PAGE_SIZE)?;
        if page_size > MAX_PAGE_SIZE {
            return Err(AppError::BadRequest(format!(
                "pageSize must not exceed {}",
                MAX_PAGE_SIZE
            )));
        }

        Ok(FileQuery {
            name,
            file_type,
            min_size,
            max_size,
            from_date,
            to_date,
            page,
            page_size,
        })
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_size(value: Option<String>, field: &str) -> Result<Option<i64>, AppError> {
    match normalize(value) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|v| *v >= 0)
            .map(Some)
            .ok_or_else(|| {
                AppError::BadRequest(format!("{} must be a non-negative integer", field))
            }),
    }
}

fn parse_date(value: Option<String>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    match normalize(value) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{} must be a YYYY-MM-DD date", field))),
    }
}

fn parse_positive(value: Option<String>, field: &str, default: i64) -> Result<i64, AppError> {
    match normalize(value) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|v| *v >= 1)
            .ok_or_else(|| AppError::BadRequest(format!("{} must be a positive integer", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ListParams {
        ListParams::default()
    }

    #[test]
    fn defaults_apply_when_params_are_absent() {
        let query = FileQuery::try_from(params()).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, DEFAULT_PAGE_SIZE);
        assert!(query.name.is_none());
        assert!(query.min_size.is_none());
        assert!(query.from_date.is_none());
    }

    #[test]
    fn empty_strings_are_treated_as_unset() {
        let mut p = params();
        p.name = Some("  ".to_string());
        p.start_size = Some(String::new());
        p.start_date = Some(String::new());
        let query = FileQuery::try_from(p).unwrap();
        assert!(query.name.is_none());
        assert!(query.min_size.is_none());
        assert!(query.from_date.is_none());
    }

    #[test]
    fn zero_size_bounds_mean_no_size_filter() {
        let mut p = params();
        p.start_size = Some("0".to_string());
        p.end_size = Some("0".to_string());
        let query = FileQuery::try_from(p).unwrap();
        assert!(query.min_size.is_none());
        assert!(query.max_size.is_none());
    }

    #[test]
    fn single_zero_bound_is_kept() {
        let mut p = params();
        p.start_size = Some("0".to_string());
        p.end_size = Some("100".to_string());
        let query = FileQuery::try_from(p).unwrap();
        assert_eq!(query.min_size, Some(0));
        assert_eq!(query.max_size, Some(100));
    }

    #[test]
    fn inverted_size_range_is_rejected() {
        let mut p = params();
        p.start_size = Some("10".to_string());
        p.end_size = Some("5".to_string());
        assert!(matches!(
            FileQuery::try_from(p),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let mut p = params();
        p.start_date = Some("2024-06-01".to_string());
        p.end_date = Some("2024-05-01".to_string());
        assert!(matches!(
            FileQuery::try_from(p),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut p = params();
        p.start_size = Some("ten".to_string());
        assert!(FileQuery::try_from(p).is_err());

        let mut p = params();
        p.start_size = Some("-3".to_string());
        assert!(FileQuery::try_from(p).is_err());

        let mut p = params();
        p.start_date = Some("01/06/2024".to_string());
        assert!(FileQuery::try_from(p).is_err());

        let mut p = params();
        p.page = Some("0".to_string());
        assert!(FileQuery::try_from(p).is_err());

        let mut p = params();
        p.page_size = Some("500".to_string());
        assert!(FileQuery::try_from(p).is_err());
    }

    #[test]
    fn body_exposes_download_reference() {
        let record = FileRecord {
            id: Uuid::new_v4(),
            original_filename: "report.pdf".to_string(),
            file_type: "application/pdf".to_string(),
            size: 42,
            file_hash: "deadbeef".to_string(),
            uploaded_at: Utc::now(),
            reference_id: None,
        };
        let id = record.id;
        let body = record.into_body();
        assert_eq!(body.file, format!("/files/{}/download", id));
    }
}
