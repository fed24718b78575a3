//! Bulk indexing and scroll helpers for OpenSearch in the Armature framework.
//!
//! This crate turns large sequences of writes into bounded bulk requests and
//! reads large result sets through scroll cursors:
//! - Streaming bulk indexing with per-item outcomes
//! - Retries with exponential backoff when the cluster throttles (429)
//! - Parallel bulk indexing over a pool of worker tasks
//! - Scanning every hit of a query
//! - Reindexing between indices or clusters
//!
//! Every helper talks to the cluster through the [`Transport`] trait;
//! [`OpenSearchClient`] implements it on top of the `opensearch` crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use armature_bulk::{bulk, Action, BulkOptions, OpenSearchClient, OpenSearchConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?;
//!
//!     let actions = (0..1000).map(|i| {
//!         Action::index("articles", json!({ "title": format!("Article {i}") })).with_id(i)
//!     });
//!
//!     let stats = bulk(&client, actions, BulkOptions::default()).await?;
//!     println!("indexed {} articles", stats.succeeded);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod action;
mod backoff;
mod chunk;
mod client;
mod config;
mod document;
mod error;
mod executor;
mod outcome;
mod parallel;
mod reindex;
mod scan;
mod streaming;
mod transport;

pub use action::{Action, ExpandedAction, OpType, expand_action};
pub use backoff::{Backoff, backoff_bulk};
pub use chunk::{Batch, ChunkBuffer, Chunks, chunk_actions};
pub use client::OpenSearchClient;
pub use config::{BulkOptions, Expander, OpenSearchConfig, ScanOptions};
pub use document::Document;
pub use error::{BulkError, BulkIndexError, Result, ScanError, TransportError};
pub use executor::BatchExecutor;
pub use outcome::{BulkItemStatus, BulkResponse, FailureKind, ItemDetail, Outcome};
pub use parallel::{ParallelBulk, parallel_bulk};
pub use reindex::{ReindexOptions, reindex, reindex_into};
pub use scan::{ScanIterator, scan};
pub use streaming::{BulkStats, StreamingBulk, bulk, streaming_bulk};
pub use transport::{Refresh, ScrollPage, SearchRequest, ShardStats, Transport, WriteParams};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Action, Backoff, BulkError, BulkOptions, BulkStats, Document, OpType, OpenSearchClient,
        OpenSearchConfig, Outcome, ReindexOptions, Result, ScanOptions, Transport, backoff_bulk,
        bulk, parallel_bulk, reindex, scan, streaming_bulk,
    };
}
