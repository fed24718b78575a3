//! Client configuration and helper options.

use crate::{
    action::{Action, ExpandedAction, expand_action},
    backoff::Backoff,
    transport::{Refresh, SearchRequest, WriteParams},
};
use serde_json::{Value, json};
use std::{env, fmt, sync::Arc, time::Duration};

/// OpenSearch client configuration.
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// OpenSearch URL(s).
    pub urls: Vec<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl OpenSearchConfig {
    /// Create a new configuration with a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Load configuration from `OPENSEARCH_URL`, `OPENSEARCH_USERNAME`,
    /// `OPENSEARCH_PASSWORD` and `OPENSEARCH_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let url = env::var("OPENSEARCH_URL").unwrap_or_else(|_| "http://localhost:9200".to_string());
        let mut config = Self::new(url);

        if let (Ok(user), Ok(pass)) = (env::var("OPENSEARCH_USERNAME"), env::var("OPENSEARCH_PASSWORD")) {
            config = config.with_basic_auth(user, pass);
        }

        if let Some(secs) = env::var("OPENSEARCH_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        config
    }

    /// Set basic authentication credentials.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Custom action expansion.
pub type Expander = Arc<dyn Fn(&Action) -> ExpandedAction + Send + Sync>;

/// Tuning and error policy for the bulk helpers.
#[derive(Clone)]
pub struct BulkOptions {
    /// Maximum actions per request.
    pub chunk_size: usize,
    /// Maximum serialized bytes per request.
    pub max_chunk_bytes: usize,
    /// Raise [`BulkIndexError`](crate::BulkIndexError) when items of a batch fail.
    pub raise_on_error: bool,
    /// Propagate transport errors instead of turning them into failed items.
    /// A 429 is held back while the backoff policy has a retry left.
    pub raise_on_exception: bool,
    /// Yield successful outcomes.
    pub yield_ok: bool,
    /// Item statuses that never count as errors.
    pub ignore_status: Vec<u16>,
    /// Report counts only from [`bulk`](crate::bulk).
    pub stats_only: bool,
    /// Retry policy for throttled items.
    pub backoff: Backoff,
    /// Worker tasks for [`parallel_bulk`](crate::parallel_bulk).
    pub thread_count: usize,
    /// Batches' worth of actions buffered ahead of the parallel workers.
    pub queue_size: usize,
    /// Parameters sent with every bulk request.
    pub params: WriteParams,
    expander: Option<Expander>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            max_chunk_bytes: 100 * 1024 * 1024,
            raise_on_error: true,
            raise_on_exception: true,
            yield_ok: true,
            ignore_status: Vec::new(),
            stats_only: false,
            backoff: Backoff::default(),
            thread_count: 4,
            queue_size: 4,
            params: WriteParams::default(),
            expander: None,
        }
    }
}

impl fmt::Debug for BulkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkOptions")
            .field("chunk_size", &self.chunk_size)
            .field("max_chunk_bytes", &self.max_chunk_bytes)
            .field("raise_on_error", &self.raise_on_error)
            .field("raise_on_exception", &self.raise_on_exception)
            .field("yield_ok", &self.yield_ok)
            .field("ignore_status", &self.ignore_status)
            .field("stats_only", &self.stats_only)
            .field("backoff", &self.backoff)
            .field("thread_count", &self.thread_count)
            .field("queue_size", &self.queue_size)
            .field("params", &self.params)
            .field("custom_expander", &self.expander.is_some())
            .finish()
    }
}

impl BulkOptions {
    /// Set maximum actions per request.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set maximum bytes per request.
    pub fn with_max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.max_chunk_bytes = bytes;
        self
    }

    /// Raise on failed items.
    pub fn with_raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Raise on transport errors.
    pub fn with_raise_on_exception(mut self, raise: bool) -> Self {
        self.raise_on_exception = raise;
        self
    }

    /// Yield successful outcomes.
    pub fn with_yield_ok(mut self, yield_ok: bool) -> Self {
        self.yield_ok = yield_ok;
        self
    }

    /// Set statuses that never count as errors.
    pub fn with_ignore_status(mut self, statuses: Vec<u16>) -> Self {
        self.ignore_status = statuses;
        self
    }

    /// Report counts only.
    pub fn with_stats_only(mut self, stats_only: bool) -> Self {
        self.stats_only = stats_only;
        self
    }

    /// Set the retry policy for throttled items.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the number of parallel workers.
    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    /// Set how many batches of input are buffered for parallel workers.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Set per-request write parameters.
    pub fn with_params(mut self, params: WriteParams) -> Self {
        self.params = params;
        self
    }

    /// Set the default index.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.params.index = Some(index.into());
        self
    }

    /// Set the refresh policy.
    pub fn with_refresh(mut self, refresh: Refresh) -> Self {
        self.params.refresh = Some(refresh);
        self
    }

    /// Require every action to target an alias.
    pub fn with_require_alias(mut self, require_alias: bool) -> Self {
        self.params.require_alias = Some(require_alias);
        self
    }

    /// Replace the default action expansion.
    pub fn expand_with<F>(mut self, expander: F) -> Self
    where
        F: Fn(&Action) -> ExpandedAction + Send + Sync + 'static,
    {
        self.expander = Some(Arc::new(expander));
        self
    }

    /// Expand one action with the configured expander.
    pub fn expand(&self, action: &Action) -> ExpandedAction {
        match &self.expander {
            Some(expander) => expander(action),
            None => expand_action(action),
        }
    }

    /// Whether a failed item with `status` should be raised.
    pub(crate) fn raises(&self, status: Option<u16>) -> bool {
        self.raise_on_error && !status.is_some_and(|s| self.ignore_status.contains(&s))
    }
}

/// Options for [`scan`](crate::scan).
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Indices to read.
    pub index: Vec<String>,
    /// Search body (`query`, `_source`, ...).
    pub query: Option<Value>,
    /// Scroll keep-alive.
    pub scroll: String,
    /// Hits per page.
    pub size: i64,
    /// Raise [`ScanError`](crate::ScanError) when shards fail.
    pub raise_on_error: bool,
    /// Keep the query's sort order instead of the cheaper index order.
    pub preserve_order: bool,
    /// Release the cursor when done.
    pub clear_scroll: bool,
    /// Routing keys.
    pub routing: Vec<String>,
    /// Client-side timeout for the initial search.
    pub request_timeout: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            index: Vec::new(),
            query: None,
            scroll: "5m".to_string(),
            size: 1000,
            raise_on_error: true,
            preserve_order: false,
            clear_scroll: true,
            routing: Vec::new(),
            request_timeout: None,
        }
    }
}

impl ScanOptions {
    /// Scan one index.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: vec![index.into()],
            ..Default::default()
        }
    }

    /// Set the search body.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Set the scroll keep-alive.
    pub fn with_scroll(mut self, ttl: impl Into<String>) -> Self {
        self.scroll = ttl.into();
        self
    }

    /// Set hits per page.
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    /// Raise on shard failures.
    pub fn with_raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Keep the query's sort order.
    pub fn with_preserve_order(mut self, preserve: bool) -> Self {
        self.preserve_order = preserve;
        self
    }

    /// Release the cursor when done.
    pub fn with_clear_scroll(mut self, clear: bool) -> Self {
        self.clear_scroll = clear;
        self
    }

    /// Add a routing key.
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing.push(routing.into());
        self
    }

    /// Set the initial search timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the initial search. Unless order is preserved, hits are sorted by
    /// `_doc`, the cheapest order for a scroll.
    pub(crate) fn search_request(&self) -> SearchRequest {
        let mut body = self.query.clone().unwrap_or_else(|| json!({}));
        if !self.preserve_order {
            if let Value::Object(map) = &mut body {
                map.insert("sort".to_string(), json!(["_doc"]));
            }
        }

        SearchRequest {
            index: self.index.clone(),
            body,
            scroll: self.scroll.clone(),
            size: self.size,
            routing: self.routing.clone(),
            request_timeout: self.request_timeout,
        }
    }
}
