//! Store-backed scenarios against a live PostgreSQL.
//!
//! These exercise the batch writer and both repository search paths end to
//! end. They are ignored by default; run them serially against a throwaway
//! database:
//!
//! ```text
//! ABR_SEARCH_TEST_DATABASE_URL=postgres://localhost/abr_test \
//!     cargo test --test pg_test -- --ignored --test-threads=1
//! ```

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use abr_search::config::Config;
use abr_search::db::repository::Repository;
use abr_search::db::schema;
use abr_search::ingest::writer::BatchWriter;
use abr_search::models::{BusinessName, NewBusiness, SearchQuery};

fn test_url() -> String {
    std::env::var("ABR_SEARCH_TEST_DATABASE_URL")
        .expect("set ABR_SEARCH_TEST_DATABASE_URL to run store tests")
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.database.url = test_url();
    // no pacing sleeps in tests
    config.etl.flush_delay_ms = 0;
    config
}

/// Connect, migrate, and wipe both tables.
async fn fresh_store(config: &Config) -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database.url)
        .await
        .unwrap();
    schema::migrate(&pool).await.unwrap();
    sqlx::raw_sql("TRUNCATE businesses RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

fn business(abn: &str, name: &str, state: &str, names: &[(&str, &str)]) -> NewBusiness {
    NewBusiness {
        abn: abn.to_string(),
        abn_status: "ACT".to_string(),
        entity_type_code: "PRV".to_string(),
        entity_name: name.to_string(),
        state: Some(state.to_string()),
        postcode: Some("2000".to_string()),
        other_names: names
            .iter()
            .map(|(name_type, name_text)| BusinessName {
                name_type: (*name_type).to_string(),
                name_text: (*name_text).to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Run rows through a batch writer with its own private pool, the way the
/// ingestion isolate does.
async fn ingest(config: &Config, rows: Vec<NewBusiness>) {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database.url)
        .await
        .unwrap();
    let writer = BatchWriter::new(pool, &config.etl);
    for row in rows {
        writer.add(row).await.unwrap();
    }
    writer.flush().await.unwrap();
    writer.destroy().await.unwrap();
}

async fn count_businesses(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM businesses")
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn names_of(pool: &PgPool, abn: &str) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT n.name_text FROM business_names n \
         JOIN businesses b ON b.id = n.business_id \
         WHERE b.abn = $1 ORDER BY n.name_text",
    )
    .bind(abn)
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_ingest_is_idempotent() {
    let config = test_config();
    let pool = fresh_store(&config).await;

    let rows = || {
        vec![
            business(
                "53004085616",
                "VANTAGE SEARCH PTY LTD",
                "NSW",
                &[("TRD", "VANTAGE DIRECTORY"), ("BN", "VANTAGE SEARCH")],
            ),
            business("11111111111", "ACME HOLDINGS PTY LTD", "VIC", &[]),
        ]
    };

    ingest(&config, rows()).await;
    let first_count = count_businesses(&pool).await;
    let first_names = names_of(&pool, "53004085616").await;

    ingest(&config, rows()).await;
    assert_eq!(count_businesses(&pool).await, first_count);
    assert_eq!(names_of(&pool, "53004085616").await, first_names);
    assert_eq!(first_names.len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_reingest_replaces_child_names() {
    let config = test_config();
    let pool = fresh_store(&config).await;

    ingest(
        &config,
        vec![business(
            "53004085616",
            "VANTAGE SEARCH PTY LTD",
            "NSW",
            &[("TRD", "ALPHA"), ("BN", "BRAVO")],
        )],
    )
    .await;

    ingest(
        &config,
        vec![business(
            "53004085616",
            "VANTAGE SEARCH PTY LTD",
            "NSW",
            &[("BN", "BRAVO"), ("TRD", "CHARLIE")],
        )],
    )
    .await;

    // No residual ALPHA after the second run.
    assert_eq!(
        names_of(&pool, "53004085616").await,
        vec!["BRAVO".to_string(), "CHARLIE".to_string()]
    );
}

#[tokio::test]
#[ignore]
async fn test_find_by_abn_hit_and_miss() {
    let config = test_config();
    let pool = fresh_store(&config).await;

    ingest(
        &config,
        vec![business(
            "53004085616",
            "VANTAGE SEARCH PTY LTD",
            "NSW",
            &[("TRD", "VANTAGE DIRECTORY"), ("BN", "VANTAGE SEARCH")],
        )],
    )
    .await;

    let repository = Repository::new(pool.clone(), &config);

    let (found, _query_time) = repository.find_by_abn("53004085616").await.unwrap();
    let found = found.unwrap();
    assert_eq!(found.entity_name, "VANTAGE SEARCH PTY LTD");
    assert_eq!(found.business_names.as_ref().unwrap().len(), 2);

    let (missing, _query_time) = repository.find_by_abn("00000000000").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[ignore]
async fn test_filter_only_pagination() {
    let config = test_config();
    let pool = fresh_store(&config).await;

    let mut rows = Vec::new();
    for i in 0..100 {
        rows.push(business(
            &format!("1{i:010}"),
            &format!("SYDNEY COMPANY {i:03} PTY LTD"),
            "NSW",
            &[],
        ));
    }
    for i in 0..50 {
        rows.push(business(
            &format!("2{i:010}"),
            &format!("MELBOURNE COMPANY {i:03} PTY LTD"),
            "VIC",
            &[],
        ));
    }
    ingest(&config, rows).await;

    let repository = Repository::new(pool.clone(), &config);
    let query = SearchQuery {
        state: Some("NSW".to_string()),
        page: 2,
        limit: 20,
        ..Default::default()
    };
    let results = repository.find_with_filters(&query).await.unwrap();

    assert_eq!(results.pagination.page, 2);
    assert_eq!(results.pagination.limit, 20);
    assert_eq!(results.pagination.total, 100);
    assert_eq!(results.pagination.total_pages, 5);
    assert_eq!(results.data.len(), 20);
    assert!(results.data.iter().all(|b| b.state.as_deref() == Some("NSW")));
    // alphabetical ordering continues across pages
    assert_eq!(results.data[0].entity_name, "SYDNEY COMPANY 020 PTY LTD");
}

#[tokio::test]
#[ignore]
async fn test_candidate_cap_saturates_total() {
    let mut config = test_config();
    config.search.max_candidates = 100;
    let pool = fresh_store(&config).await;

    let rows: Vec<NewBusiness> = (0..150)
        .map(|i| {
            business(
                &format!("3{i:010}"),
                &format!("WIDGET FACTORY {i:04} PTY LTD"),
                "QLD",
                &[],
            )
        })
        .collect();
    ingest(&config, rows).await;

    let repository = Repository::new(pool.clone(), &config);
    let query = SearchQuery {
        term: Some("widget".to_string()),
        page: 1,
        limit: 20,
        ..Default::default()
    };
    let results = repository.search_native(&query).await.unwrap();

    // True universe is 150; the reported total saturates at the cap.
    assert_eq!(results.pagination.total, 100);
    assert_eq!(results.pagination.total_pages, 5);
    assert_eq!(results.data.len(), 20);
}

#[tokio::test]
#[ignore]
async fn test_optimized_path_prefix_and_subset_of_native() {
    let config = test_config();
    let pool = fresh_store(&config).await;

    ingest(
        &config,
        vec![
            business("53004085616", "VANTAGE SEARCH PTY LTD", "NSW", &[]),
            business("11111111111", "ADVANTAGE CONSULTING PTY LTD", "NSW", &[]),
            business("22222222222", "UNRELATED HOLDINGS PTY LTD", "VIC", &[]),
        ],
    )
    .await;

    let repository = Repository::new(pool.clone(), &config);

    // Prefix of a whole word: the optimized path must still match it.
    let query = SearchQuery {
        term: Some("vanta".to_string()),
        page: 1,
        limit: 20,
        ..Default::default()
    };
    let optimized = repository.search_optimized(&query).await.unwrap();
    assert!(optimized
        .data
        .iter()
        .any(|b| b.abn == "53004085616"));

    // Whole-token term: native substring results must cover every
    // optimized hit (native also sees mid-word matches like ADVANTAGE).
    let query = SearchQuery {
        term: Some("vantage".to_string()),
        page: 1,
        limit: 20,
        ..Default::default()
    };
    let native = repository.search_native(&query).await.unwrap();
    let optimized = repository.search_optimized(&query).await.unwrap();

    let native_abns: Vec<&str> = native.data.iter().map(|b| b.abn.as_str()).collect();
    assert!(native_abns.contains(&"11111111111"));
    for hit in &optimized.data {
        assert!(native_abns.contains(&hit.abn.as_str()));
    }
}

#[tokio::test]
#[ignore]
async fn test_empty_term_degenerates_to_filters() {
    let config = test_config();
    let pool = fresh_store(&config).await;

    ingest(
        &config,
        vec![
            business("11111111111", "ACME PTY LTD", "NSW", &[]),
            business("22222222222", "ZENITH PTY LTD", "NSW", &[]),
        ],
    )
    .await;

    let repository = Repository::new(pool.clone(), &config);
    let query = SearchQuery {
        term: Some("   ".to_string()),
        state: Some("NSW".to_string()),
        page: 1,
        limit: 20,
        ..Default::default()
    };

    let native = repository.search_native(&query).await.unwrap();
    let optimized = repository.search_optimized(&query).await.unwrap();
    assert_eq!(native.pagination.total, 2);
    assert_eq!(optimized.pagination.total, 2);
    assert_eq!(native.data[0].entity_name, "ACME PTY LTD");
}

#[tokio::test]
#[ignore]
async fn test_search_tokens_maintained_by_store() {
    let config = test_config();
    let pool = fresh_store(&config).await;

    ingest(
        &config,
        vec![business("11111111111", "ACME PTY LTD", "NSW", &[])],
    )
    .await;

    // The trigger populated the column even though the writer never set it.
    let populated: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM businesses WHERE search_tokens IS NOT NULL",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(populated, 1);
}
