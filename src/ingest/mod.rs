//! Streaming ingestion of ABR bulk-extract XML into the store.
//!
//! Pipeline: [`xml::RecordReader`] pulls raw records off the byte stream,
//! [`adapter::normalize`] shapes them into domain rows, and
//! [`writer::BatchWriter`] lands them in chunked, retried, transactional
//! upserts. [`orchestrator`] runs the whole thing in an isolate and bridges
//! progress back to the caller.

pub mod adapter;
pub mod orchestrator;
pub mod writer;
pub mod xml;
