use std::time::Instant;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{Meta, SearchMode, SearchQuery, SearchResponse, SearchTechnique};
use crate::state::AppState;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

/// Raw query string, before normalization. Numeric fields arrive as strings
/// so that clamping and validation stay under our control rather than the
/// extractor's.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub entity_type: Option<String>,
    pub abn_status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub mode: Option<String>,
    pub technique: Option<String>,
}

/// GET /api/v1/businesses/search
///
/// `technique` selects the repository path (`native` is the baseline,
/// `optimized` goes through the token index); `mode=ai` is reserved for the
/// natural-language translator and fails as not implemented.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let started = Instant::now();

    // mode takes precedence: ai is 501 whatever the technique says.
    if SearchMode::parse(params.mode.as_deref())? == SearchMode::Ai {
        return Err(AppError::NotImplemented(
            "AI search is not implemented yet".to_string(),
        ));
    }
    let technique = SearchTechnique::parse(params.technique.as_deref())?;
    let query = normalize_query(&params)?;

    let results = match technique {
        SearchTechnique::Optimized => state.repository.search_optimized(&query).await?,
        SearchTechnique::Native => state.repository.search_native(&query).await?,
    };

    Ok(Json(SearchResponse {
        status: "success",
        data: results.data,
        pagination: results.pagination,
        meta: Meta {
            query_time_ms: results.query_time_ms,
            total_time_ms: started.elapsed().as_millis() as u64,
        },
    }))
}

/// Controller-level parameter normalization: `page` ≥ 1, `limit` within
/// [1, 100], blank strings treated as absent.
fn normalize_query(params: &SearchParams) -> Result<SearchQuery, AppError> {
    Ok(SearchQuery {
        term: clean(&params.q),
        state: clean(&params.state),
        postcode: clean(&params.postcode),
        entity_type: clean(&params.entity_type),
        abn_status: clean(&params.abn_status),
        page: parse_clamped(&params.page, "page", DEFAULT_PAGE, 1, u32::MAX)?,
        limit: parse_clamped(&params.limit, "limit", DEFAULT_LIMIT, 1, MAX_LIMIT)?,
    })
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_clamped(
    raw: &Option<String>,
    name: &str,
    default: u32,
    min: u32,
    max: u32,
) -> Result<u32, AppError> {
    match raw.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => {
            let parsed: i64 = value.parse().map_err(|_| {
                AppError::Validation(format!("Invalid {name} parameter: {value}"))
            })?;
            Ok(parsed.clamp(i64::from(min), i64::from(max)) as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let query = normalize_query(&SearchParams::default()).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
        assert_eq!(query.term, None);
    }

    #[test]
    fn test_blank_strings_treated_as_absent() {
        let params = SearchParams {
            q: Some("  ".to_string()),
            state: Some(String::new()),
            page: Some(" ".to_string()),
            ..Default::default()
        };
        let query = normalize_query(&params).unwrap();
        assert_eq!(query.term, None);
        assert_eq!(query.state, None);
        assert_eq!(query.page, 1);
    }

    #[test]
    fn test_page_clamped_to_one() {
        let params = SearchParams {
            page: Some("0".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize_query(&params).unwrap().page, 1);

        let params = SearchParams {
            page: Some("-3".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize_query(&params).unwrap().page, 1);
    }

    #[test]
    fn test_limit_clamped_to_range() {
        let params = SearchParams {
            limit: Some("500".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize_query(&params).unwrap().limit, 100);

        let params = SearchParams {
            limit: Some("0".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize_query(&params).unwrap().limit, 1);
    }

    #[test]
    fn test_non_numeric_page_rejected() {
        let params = SearchParams {
            page: Some("two".to_string()),
            ..Default::default()
        };
        let err = normalize_query(&params).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_filters_pass_through() {
        let params = SearchParams {
            state: Some("NSW".to_string()),
            postcode: Some("2000".to_string()),
            entity_type: Some("PRV".to_string()),
            abn_status: Some("ACT".to_string()),
            ..Default::default()
        };
        let query = normalize_query(&params).unwrap();
        assert_eq!(query.state.as_deref(), Some("NSW"));
        assert_eq!(query.postcode.as_deref(), Some("2000"));
        assert_eq!(query.entity_type.as_deref(), Some("PRV"));
        assert_eq!(query.abn_status.as_deref(), Some("ACT"));
    }
}
