//! The seam between the helpers and the document store.

use crate::error::{BulkError, Result, TransportError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// When written documents become visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Refresh the affected shards immediately.
    True,
    /// Do not refresh.
    False,
    /// Wait for the next scheduled refresh before answering.
    WaitFor,
}

/// Parameters applied to every bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteParams {
    /// Default index for actions that do not name one.
    pub index: Option<String>,
    /// Refresh policy.
    pub refresh: Option<Refresh>,
    /// Default routing key.
    pub routing: Option<String>,
    /// Default ingest pipeline.
    pub pipeline: Option<String>,
    /// Server-side timeout, e.g. `"1m"`.
    pub timeout: Option<String>,
    /// Active shard copies required before writing, e.g. `"all"`.
    pub wait_for_active_shards: Option<String>,
    /// Reject actions whose target is a concrete index rather than an alias.
    pub require_alias: Option<bool>,
}

/// An initial scroll search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Indices to search; empty searches all.
    pub index: Vec<String>,
    /// Search body.
    pub body: Value,
    /// Scroll keep-alive, e.g. `"5m"`.
    pub scroll: String,
    /// Hits per page.
    pub size: i64,
    /// Routing keys.
    pub routing: Vec<String>,
    /// Client-side timeout for this request.
    pub request_timeout: Option<Duration>,
}

/// Access to a document store's bulk and scroll endpoints.
///
/// Implementations return the raw JSON response of each call. A non-2xx
/// answer to the request as a whole is a [`TransportError`] carrying the
/// status; per-item failures inside a bulk response are not.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one bulk request. `body` holds the NDJSON lines in order.
    async fn bulk(
        &self,
        body: Vec<Value>,
        params: &WriteParams,
    ) -> std::result::Result<Value, TransportError>;

    /// Open a scroll cursor with an initial search.
    async fn search(&self, request: &SearchRequest) -> std::result::Result<Value, TransportError>;

    /// Fetch the next page of a scroll cursor.
    async fn scroll(&self, scroll_id: &str, ttl: &str) -> std::result::Result<Value, TransportError>;

    /// Release a scroll cursor.
    async fn clear_scroll(&self, scroll_id: &str) -> std::result::Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn bulk(
        &self,
        body: Vec<Value>,
        params: &WriteParams,
    ) -> std::result::Result<Value, TransportError> {
        (**self).bulk(body, params).await
    }

    async fn search(&self, request: &SearchRequest) -> std::result::Result<Value, TransportError> {
        (**self).search(request).await
    }

    async fn scroll(&self, scroll_id: &str, ttl: &str) -> std::result::Result<Value, TransportError> {
        (**self).scroll(scroll_id, ttl).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> std::result::Result<(), TransportError> {
        (**self).clear_scroll(scroll_id).await
    }
}

#[async_trait]
impl<'a, T: Transport + ?Sized> Transport for &'a T {
    async fn bulk(
        &self,
        body: Vec<Value>,
        params: &WriteParams,
    ) -> std::result::Result<Value, TransportError> {
        (**self).bulk(body, params).await
    }

    async fn search(&self, request: &SearchRequest) -> std::result::Result<Value, TransportError> {
        (**self).search(request).await
    }

    async fn scroll(&self, scroll_id: &str, ttl: &str) -> std::result::Result<Value, TransportError> {
        (**self).scroll(scroll_id, ttl).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> std::result::Result<(), TransportError> {
        (**self).clear_scroll(scroll_id).await
    }
}

/// Shard accounting of a search or scroll page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ShardStats {
    /// Shards targeted.
    #[serde(default)]
    pub total: u64,
    /// Shards that answered.
    #[serde(default)]
    pub successful: u64,
    /// Shards skipped as irrelevant.
    #[serde(default)]
    pub skipped: u64,
    /// Shards that failed.
    #[serde(default)]
    pub failed: u64,
}

impl ShardStats {
    /// Whether every shard either answered or was skipped.
    pub fn is_complete(&self) -> bool {
        self.successful + self.skipped >= self.total
    }
}

/// One page of a scroll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollPage {
    /// Cursor for the next page.
    pub scroll_id: Option<String>,
    /// Shard accounting.
    pub shards: ShardStats,
    /// The hits of this page.
    pub hits: Vec<Value>,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(rename = "_shards", default)]
    shards: ShardStats,
    #[serde(default)]
    hits: RawHits,
}

#[derive(Deserialize, Default)]
struct RawHits {
    #[serde(default)]
    hits: Vec<Value>,
}

impl ScrollPage {
    /// Decode a search or scroll response.
    pub fn from_response(response: Value) -> Result<Self> {
        let raw: RawPage = serde_json::from_value(response).map_err(BulkError::from)?;
        Ok(Self {
            scroll_id: raw.scroll_id,
            shards: raw.shards,
            hits: raw.hits.hits,
        })
    }
}
