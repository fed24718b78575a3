//! Copying documents from one index into another.
//!
//! Hits are read with [`scan`] and written back with the streaming bulk
//! helper, so the source and target may live on different clusters. The
//! server-side `_reindex` API is usually faster when both indices share a
//! cluster.

use crate::{
    action::{Action, OpType},
    config::{BulkOptions, ScanOptions},
    error::{BulkError, Result},
    scan::scan,
    streaming::{BulkStats, StreamingBulk, collect_stats},
    transport::Transport,
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Options for [`reindex`].
#[derive(Debug, Clone)]
pub struct ReindexOptions {
    /// Index to read from.
    pub source_index: String,
    /// Index every document is written to.
    pub target_index: String,
    /// Search body selecting the documents to copy.
    pub query: Option<Value>,
    /// Operation to write with, e.g. `create` to skip existing ids.
    pub op_type: Option<OpType>,
    /// Scan settings; the index and query are taken from this struct.
    pub scan: ScanOptions,
    /// Bulk settings for the writes.
    pub bulk: BulkOptions,
}

impl ReindexOptions {
    /// Copy `source_index` into `target_index`.
    pub fn new(source_index: impl Into<String>, target_index: impl Into<String>) -> Self {
        let source_index = source_index.into();
        Self {
            scan: ScanOptions::new(source_index.clone()),
            source_index,
            target_index: target_index.into(),
            query: None,
            op_type: None,
            bulk: BulkOptions::default()
                .with_chunk_size(500)
                .with_stats_only(true),
        }
    }

    /// Only copy documents matching `query` (a full search body).
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Write with the given operation.
    pub fn with_op_type(mut self, op_type: OpType) -> Self {
        self.op_type = Some(op_type);
        self
    }

    /// Set the scroll keep-alive.
    pub fn with_scroll(mut self, ttl: impl Into<String>) -> Self {
        self.scan.scroll = ttl.into();
        self
    }

    /// Set the number of documents per bulk request.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.bulk.chunk_size = chunk_size;
        self
    }

    /// Replace the scan settings.
    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Replace the bulk settings.
    pub fn with_bulk_options(mut self, bulk: BulkOptions) -> Self {
        self.bulk = bulk;
        self
    }

    fn scan_options(&self) -> ScanOptions {
        let mut scan = self.scan.clone();
        scan.index = vec![self.source_index.clone()];
        if let Some(query) = &self.query {
            scan.query = Some(query.clone());
        }
        scan
    }
}

/// Copy documents within one cluster.
///
/// ```rust,no_run
/// use armature_bulk::{reindex, OpenSearchClient, OpenSearchConfig, ReindexOptions};
/// use std::sync::Arc;
///
/// # async fn example() -> armature_bulk::Result<()> {
/// let client = Arc::new(OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?);
/// let stats = reindex(client, ReindexOptions::new("logs-2024", "logs-archive")).await?;
/// println!("copied {} documents", stats.succeeded);
/// # Ok(())
/// # }
/// ```
pub async fn reindex<C>(client: Arc<C>, options: ReindexOptions) -> Result<BulkStats>
where
    C: Transport + ?Sized + 'static,
{
    reindex_into(client.clone(), client, options).await
}

/// Copy documents from `source` into `target`, which may be another cluster.
pub async fn reindex_into<S, T>(source: Arc<S>, target: T, options: ReindexOptions) -> Result<BulkStats>
where
    S: Transport + ?Sized + 'static,
    T: Transport,
{
    info!(
        source = %options.source_index,
        target = %options.target_index,
        "Reindexing documents"
    );

    let target_index = options.target_index.clone();
    let op_type = options.op_type.clone();
    let hits = scan(source, options.scan_options())
        .into_stream()
        .map(move |hit| hit.and_then(|hit| retarget(hit, &target_index, op_type.as_ref())));

    let bulk = options.bulk.with_yield_ok(true);
    collect_stats(StreamingBulk::try_from_stream(target, hits, bulk)).await
}

/// Point a hit at `index`, flattening any `fields` projection into it.
fn retarget(hit: Value, index: &str, op_type: Option<&OpType>) -> Result<Action> {
    let Value::Object(mut map) = hit else {
        return Err(BulkError::Validation("Scan hit is not an object".to_string()));
    };

    map.insert("_index".to_string(), Value::String(index.to_string()));
    if let Some(op_type) = op_type {
        map.insert("_op_type".to_string(), Value::String(op_type.as_str().to_string()));
    }
    match map.remove("fields") {
        Some(Value::Object(fields)) => map.extend(fields),
        Some(other) => {
            map.insert("fields".to_string(), other);
        }
        None => {}
    }

    Ok(Action::from(map))
}
