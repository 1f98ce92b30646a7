use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A business record as served by the API. One row per unique ABN.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: i64,
    pub abn: String,
    pub abn_status: String,
    pub abn_status_from: Option<NaiveDate>,
    pub entity_type_code: String,
    pub entity_type_text: Option<String>,
    pub entity_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub gst_status: Option<String>,
    pub gst_from_date: Option<NaiveDate>,
    pub acn: Option<String>,
    pub record_last_updated: Option<NaiveDate>,
    /// Child names; populated only on by-key lookup.
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_names: Option<Vec<BusinessName>>,
}

/// An alternate (trading, legal, DGR, ...) name owned by a business.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessName {
    pub name_type: String,
    pub name_text: String,
}

/// A normalized business ready for upsert, as produced by the ingest adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBusiness {
    pub abn: String,
    pub abn_status: String,
    pub abn_status_from: Option<NaiveDate>,
    pub entity_type_code: String,
    pub entity_type_text: Option<String>,
    pub entity_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub gst_status: Option<String>,
    pub gst_from_date: Option<NaiveDate>,
    pub acn: Option<String>,
    pub record_last_updated: Option<NaiveDate>,
    pub other_names: Vec<BusinessName>,
}

/// A child-name row resolved to its owning business id.
#[derive(Debug, Clone)]
pub struct NameRow {
    pub business_id: i64,
    pub name_type: String,
    pub name_text: String,
}

/// A normalized search request: optional free-text term plus equality filters.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub term: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub entity_type: Option<String>,
    pub abn_status: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl SearchQuery {
    /// The text term, if it carries any non-whitespace content.
    pub fn effective_term(&self) -> Option<&str> {
        self.term.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// Which repository search path serves the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTechnique {
    Native,
    Optimized,
}

impl SearchTechnique {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SearchTechnique::Native),
            Some("native") => Ok(SearchTechnique::Native),
            Some("optimized") => Ok(SearchTechnique::Optimized),
            Some(other) => Err(AppError::Validation(format!(
                "Unknown search technique: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Standard,
    Ai,
}

impl SearchMode {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SearchMode::Standard),
            Some("standard") => Ok(SearchMode::Standard),
            Some("ai") => Ok(SearchMode::Ai),
            Some(other) => Err(AppError::Validation(format!(
                "Unknown search mode: {other}"
            ))),
        }
    }
}

/// Pagination block of a search response. `total` is capped at the configured
/// candidate limit; `total == maxCandidates` reads as "many results".
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// What a repository search path returns: one page plus its envelope data.
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub data: Vec<Business>,
    pub pagination: Pagination,
    pub query_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub query_time_ms: u64,
    pub total_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub status: &'static str,
    pub data: Vec<Business>,
    pub pagination: Pagination,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct BusinessResponse {
    pub status: &'static str,
    pub data: Business,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: u64,
    pub timestamp: String,
}

/// Result of one ingestion run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub total_processed: u64,
    pub total_inserted: u64,
    pub total_updated: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub data: IngestReport,
}

/// POST /api/v1/ingest body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default)]
    pub file_path: Option<String>,
}
