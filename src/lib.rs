//! # abr-search
//!
//! A search service over the Australian Business Register public bulk
//! extract: a streaming XML ingestion pipeline feeding a PostgreSQL store,
//! and a paginated HTTP search API over the resulting corpus.
//!
//! ## Architecture
//!
//! Two independent planes share nothing but the store:
//!
//! ```text
//!   Ingestion plane (one isolate per run)
//!
//!   ┌──────────────┐   pull    ┌──────────────┐   add()   ┌──────────────┐
//!   │  extract XML │ ────────▶ │   parser +   │ ────────▶ │ batch writer │
//!   │  (~580 MB)   │  records  │   adapter    │  awaited  │  (buffered)  │
//!   └──────────────┘           └──────────────┘           └──────┬───────┘
//!                                                               │ one tx per batch:
//!                                                               │ upsert businesses
//!                                                               │ replace child names
//!                                                               ▼
//!                                                      ┌─────────────────┐
//!                                                      │   PostgreSQL    │
//!                                                      │ abn UNIQUE      │
//!                                                      │ search_tokens   │
//!                                                      │  (GIN index)    │
//!                                                      └────────▲────────┘
//!                                                               │
//!   Serving plane (N workers, one pool each)                    │
//!                                                               │
//!   ┌──────────────┐           ┌──────────────┐   dispatch ┌────┴─────────┐
//!   │    kernel    │ ────────▶ │ axum worker  │ ─────────▶ │  repository  │
//!   │ socket share │  accepts  │  (timing,    │  native /  │ (dual search │
//!   └──────────────┘           │   logging)   │  optimized │    paths)    │
//!                              └──────────────┘            └──────────────┘
//! ```
//!
//! The pull loop is the backpressure: the parser only reads another record
//! after the writer has accepted the previous one, so in-flight memory is
//! bounded by the batch size regardless of document size.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration with fail-fast validation
//! - [`models`] - Domain types, search queries, response envelopes
//! - [`error`] - Operational/unexpected error taxonomy and HTTP mapping
//! - [`db::schema`] - Tables, indexes, and the search-token trigger
//! - [`db::repository`] - Bulk upsert, by-key lookup, dual search paths
//! - [`ingest::xml`] - Streaming record reader over quick-xml events
//! - [`ingest::adapter`] - Raw record normalization (names, sentinel dates)
//! - [`ingest::writer`] - Chunked transactional upserts with retry/pacing
//! - [`ingest::orchestrator`] - The ingestion isolate and its message channel
//! - [`api`] - Axum handlers: search, by-key lookup, health, ingest
//! - [`cluster`] - Primary/worker serving topology and graceful shutdown
//! - [`state`] - Per-worker shared state (config + repository)

pub mod api;
pub mod cluster;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod state;
