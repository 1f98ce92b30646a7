//! Repository over the `businesses` / `business_names` tables.
//!
//! Two search paths exist over the same corpus. The native path is a plain
//! case-insensitive substring match on `entity_name` and serves as the
//! performance baseline; the optimized path matches the store-maintained
//! `search_tokens` column through the GIN index. Both share one pagination
//! envelope with a capped candidate count so broad terms cannot trigger
//! unbounded counting.

use std::collections::HashMap;
use std::time::Instant;

use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::models::{
    Business, BusinessName, NameRow, NewBusiness, Pagination, SearchQuery, SearchResults,
};

/// PostgreSQL's wire-protocol cap on bound values per statement.
pub(crate) const PG_BIND_LIMIT: usize = 65_535;

/// Bound columns per `businesses` row.
pub(crate) const BUSINESS_COLUMNS: usize = 14;

/// Bound columns per `business_names` row.
pub(crate) const NAME_COLUMNS: usize = 3;

/// Default rows per upsert statement; well under the protocol ceiling so
/// single-statement latency stays bounded on remote stores.
pub(crate) const UPSERT_CHUNK_ROWS: usize = 1_000;

/// Largest row count whose bound values stay strictly below the cap.
pub(crate) const fn max_rows_per_statement(columns: usize) -> usize {
    (PG_BIND_LIMIT - 1) / columns
}

const SELECT_BUSINESS: &str = "SELECT id, abn, abn_status, abn_status_from, entity_type_code, \
     entity_type_text, entity_name, given_name, family_name, state, postcode, \
     gst_status, gst_from_date, acn, record_last_updated FROM businesses";

/// Read/write access to the store, bound to one connection pool.
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
    max_candidates: i64,
    short_query_max_length: usize,
}

impl Repository {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            max_candidates: config.search.max_candidates,
            short_query_max_length: config.search.short_query_max_length,
        }
    }

    /// Connect a serving-plane pool and wrap it.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let pool = db::serving_pool(&config.database).await?;
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert-or-replace a batch of businesses keyed by ABN. Returns the
    /// number of rows submitted; empty input is a no-op.
    pub async fn bulk_upsert(&self, rows: &[NewBusiness]) -> Result<u64, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(upsert_businesses(&mut conn, rows).await?)
    }

    /// Unconditional append of child-name rows.
    pub async fn bulk_insert_names(&self, rows: &[NameRow]) -> Result<u64, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_names(&mut conn, rows).await?)
    }

    /// Resolve ABNs to surrogate ids; unknown ABNs are absent from the map.
    pub async fn get_ids_by_abns(
        &self,
        abns: &[String],
    ) -> Result<HashMap<String, i64>, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(resolve_ids(&mut conn, abns).await?)
    }

    /// Unique-index lookup; fetches the business and its child names in two
    /// statements. Returns the wall-clock query time in milliseconds.
    pub async fn find_by_abn(
        &self,
        abn: &str,
    ) -> Result<(Option<Business>, u64), AppError> {
        let started = Instant::now();

        let mut query = String::from(SELECT_BUSINESS);
        query.push_str(" WHERE abn = $1");
        let business: Option<Business> = sqlx::query_as(&query)
            .bind(abn)
            .fetch_optional(&self.pool)
            .await?;

        let business = match business {
            Some(mut b) => {
                let names: Vec<(String, String)> = sqlx::query_as(
                    "SELECT name_type, name_text FROM business_names \
                     WHERE business_id = $1 ORDER BY id",
                )
                .bind(b.id)
                .fetch_all(&self.pool)
                .await?;
                b.business_names = Some(
                    names
                        .into_iter()
                        .map(|(name_type, name_text)| BusinessName {
                            name_type,
                            name_text,
                        })
                        .collect(),
                );
                Some(b)
            }
            None => None,
        };

        Ok((business, started.elapsed().as_millis() as u64))
    }

    /// Baseline path: case-insensitive substring match on `entity_name`.
    /// Degenerates to a filter-only listing when the term is empty.
    pub async fn search_native(&self, query: &SearchQuery) -> Result<SearchResults, AppError> {
        match query.effective_term() {
            Some(term) => {
                let pattern = format!("%{}%", escape_like(term));
                self.paged_search(TextPredicate::Substring(pattern), query)
                    .await
            }
            None => self.find_with_filters(query).await,
        }
    }

    /// Index-backed path: conjunctive token query against `search_tokens`,
    /// with the final token prefix-matched so partially typed words hit.
    pub async fn search_optimized(
        &self,
        query: &SearchQuery,
    ) -> Result<SearchResults, AppError> {
        let token_query = query
            .effective_term()
            .and_then(|term| build_token_query(term, self.short_query_max_length));
        match token_query {
            Some(tokens) => {
                self.paged_search(TextPredicate::Tokens(tokens), query)
                    .await
            }
            None => self.find_with_filters(query).await,
        }
    }

    /// Filter-only listing; the empty candidate set is a valid result.
    pub async fn find_with_filters(
        &self,
        query: &SearchQuery,
    ) -> Result<SearchResults, AppError> {
        self.paged_search(TextPredicate::None, query).await
    }

    /// Shared pagination envelope: count the candidate set (capped at
    /// `max_candidates`), then fetch one page ordered by entity name.
    async fn paged_search(
        &self,
        predicate: TextPredicate,
        query: &SearchQuery,
    ) -> Result<SearchResults, AppError> {
        let started = Instant::now();

        let mut count_qb =
            QueryBuilder::new("SELECT count(*) FROM (SELECT 1 FROM businesses");
        let has_where = push_text_predicate(&mut count_qb, &predicate);
        push_filter_predicates(&mut count_qb, query, has_where);
        count_qb.push(" ORDER BY entity_name LIMIT ");
        count_qb.push_bind(self.max_candidates);
        count_qb.push(") AS capped");
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut page_qb = QueryBuilder::new(SELECT_BUSINESS);
        let has_where = push_text_predicate(&mut page_qb, &predicate);
        push_filter_predicates(&mut page_qb, query, has_where);
        page_qb.push(" ORDER BY entity_name ASC, id ASC LIMIT ");
        page_qb.push_bind(i64::from(query.limit));
        page_qb.push(" OFFSET ");
        page_qb.push_bind(query.offset());
        let data: Vec<Business> = page_qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok(SearchResults {
            data,
            pagination: Pagination::new(query.page, query.limit, total.max(0) as u64),
            query_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// The text part of a search predicate, already rendered to bind values.
enum TextPredicate {
    None,
    /// `entity_name ILIKE <pattern> ESCAPE '\'`
    Substring(String),
    /// `search_tokens @@ to_tsquery('english', <tokens>)`
    Tokens(String),
}

fn push_text_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &TextPredicate) -> bool {
    match predicate {
        TextPredicate::None => false,
        TextPredicate::Substring(pattern) => {
            qb.push(" WHERE entity_name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\'");
            true
        }
        TextPredicate::Tokens(tokens) => {
            qb.push(" WHERE search_tokens @@ to_tsquery('english', ");
            qb.push_bind(tokens.clone());
            qb.push(")");
            true
        }
    }
}

fn push_filter_predicates(
    qb: &mut QueryBuilder<'_, Postgres>,
    query: &SearchQuery,
    mut has_where: bool,
) {
    let filters = [
        ("abn_status", &query.abn_status),
        ("entity_type_code", &query.entity_type),
        ("state", &query.state),
        ("postcode", &query.postcode),
    ];
    for (column, value) in filters {
        if let Some(value) = value {
            qb.push(if has_where { " AND " } else { " WHERE " });
            qb.push(column);
            qb.push(" = ");
            qb.push_bind(value.clone());
            has_where = true;
        }
    }
}

/// Escape `%`, `_` and `\` so the term matches literally inside a LIKE
/// pattern.
pub(crate) fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build a conjunctive tsquery from a free-text term.
///
/// Tokens are reduced to alphanumerics (anything else would be tsquery
/// syntax) and lowercased. The final token carries the `:*` prefix marker;
/// terms at or below `short_max` characters degrade to prefix-only matching
/// on every token. Returns `None` when nothing searchable remains.
pub(crate) fn build_token_query(term: &str, short_max: usize) -> Option<String> {
    let tokens: Vec<String> = term
        .split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return None;
    }

    let prefix_all = term.trim().chars().count() <= short_max;
    let last = tokens.len() - 1;
    let rendered: Vec<String> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| {
            if prefix_all || i == last {
                format!("{t}:*")
            } else {
                t.clone()
            }
        })
        .collect();
    Some(rendered.join(" & "))
}

// ─── Chunked statement bodies ────────────────────────────────────────────
//
// Free functions over a raw connection so the batch writer can run them
// inside its own transaction; the Repository methods above delegate here.

pub(crate) async fn upsert_businesses(
    conn: &mut PgConnection,
    rows: &[NewBusiness],
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let chunk_rows = UPSERT_CHUNK_ROWS.min(max_rows_per_statement(BUSINESS_COLUMNS));
    for chunk in rows.chunks(chunk_rows) {
        let mut qb = QueryBuilder::new(
            "INSERT INTO businesses (abn, abn_status, abn_status_from, entity_type_code, \
             entity_type_text, entity_name, given_name, family_name, state, postcode, \
             gst_status, gst_from_date, acn, record_last_updated) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.abn.clone())
                .push_bind(row.abn_status.clone())
                .push_bind(row.abn_status_from)
                .push_bind(row.entity_type_code.clone())
                .push_bind(row.entity_type_text.clone())
                .push_bind(row.entity_name.clone())
                .push_bind(row.given_name.clone())
                .push_bind(row.family_name.clone())
                .push_bind(row.state.clone())
                .push_bind(row.postcode.clone())
                .push_bind(row.gst_status.clone())
                .push_bind(row.gst_from_date)
                .push_bind(row.acn.clone())
                .push_bind(row.record_last_updated);
        });
        qb.push(
            " ON CONFLICT (abn) DO UPDATE SET \
             abn_status = EXCLUDED.abn_status, \
             abn_status_from = EXCLUDED.abn_status_from, \
             entity_type_code = EXCLUDED.entity_type_code, \
             entity_type_text = EXCLUDED.entity_type_text, \
             entity_name = EXCLUDED.entity_name, \
             given_name = EXCLUDED.given_name, \
             family_name = EXCLUDED.family_name, \
             state = EXCLUDED.state, \
             postcode = EXCLUDED.postcode, \
             gst_status = EXCLUDED.gst_status, \
             gst_from_date = EXCLUDED.gst_from_date, \
             acn = EXCLUDED.acn, \
             record_last_updated = EXCLUDED.record_last_updated",
        );
        qb.build().execute(&mut *conn).await?;
    }

    Ok(rows.len() as u64)
}

pub(crate) async fn insert_names(
    conn: &mut PgConnection,
    rows: &[NameRow],
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    for chunk in rows.chunks(max_rows_per_statement(NAME_COLUMNS)) {
        let mut qb = QueryBuilder::new(
            "INSERT INTO business_names (business_id, name_type, name_text) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.business_id)
                .push_bind(row.name_type.clone())
                .push_bind(row.name_text.clone());
        });
        qb.build().execute(&mut *conn).await?;
    }

    Ok(rows.len() as u64)
}

pub(crate) async fn resolve_ids(
    conn: &mut PgConnection,
    abns: &[String],
) -> Result<HashMap<String, i64>, sqlx::Error> {
    if abns.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT abn, id FROM businesses WHERE abn = ANY($1)")
            .bind(abns)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().collect())
}

pub(crate) async fn delete_names_for(
    conn: &mut PgConnection,
    business_ids: &[i64],
) -> Result<u64, sqlx::Error> {
    if business_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("DELETE FROM business_names WHERE business_id = ANY($1)")
        .bind(business_ids)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
