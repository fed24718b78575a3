//! Reading every hit of a query through a scroll cursor.

use crate::{
    config::ScanOptions,
    error::{BulkError, Result, ScanError, TransportError},
    transport::{ScrollPage, Transport},
};
use futures::{Stream, stream};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns a live scroll cursor and releases it if nobody else does.
///
/// Dropping a guard that still holds an id spawns `clear_scroll` on the
/// current tokio runtime; outside a runtime the cursor is left to expire.
struct ScrollGuard<T: Transport + ?Sized + 'static> {
    client: Arc<T>,
    scroll_id: Option<String>,
}

impl<T: Transport + ?Sized + 'static> ScrollGuard<T> {
    fn new(client: Arc<T>) -> Self {
        Self {
            client,
            scroll_id: None,
        }
    }

    fn get(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    fn set(&mut self, scroll_id: String) {
        self.scroll_id = Some(scroll_id);
    }

    /// Release the cursor now.
    async fn clear(&mut self) {
        if let Some(id) = self.scroll_id.take() {
            debug!("Clearing scroll cursor");
            if let Err(e) = self.client.clear_scroll(&id).await {
                warn!(status = ?e.status, "Failed to clear scroll cursor: {}", e);
            }
        }
    }

    /// Forget the cursor without releasing it.
    fn disarm(&mut self) {
        self.scroll_id = None;
    }
}

impl<T: Transport + ?Sized + 'static> Drop for ScrollGuard<T> {
    fn drop(&mut self) {
        let Some(id) = self.scroll_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                handle.spawn(async move {
                    if let Err(e) = client.clear_scroll(&id).await {
                        warn!(status = ?e.status, "Failed to clear scroll cursor: {}", e);
                    }
                });
            }
            Err(_) => debug!("No runtime to clear scroll cursor, leaving it to expire"),
        }
    }
}

#[derive(Clone, Copy)]
enum State {
    Init,
    Streaming,
    Done,
}

/// Lazily yields every hit matching a query.
///
/// The initial search is sent on the first call to [`next`](Self::next).
/// Hits come back in index order unless
/// [`preserve_order`](ScanOptions::preserve_order) is set. The cursor is
/// cleared when the scan is exhausted, fails, is [closed](Self::close), or
/// is dropped early.
///
/// ```rust,no_run
/// use armature_bulk::{scan, OpenSearchClient, OpenSearchConfig, ScanOptions};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> armature_bulk::Result<()> {
/// let client = Arc::new(OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?);
/// let options = ScanOptions::new("logs").with_query(json!({ "query": { "match_all": {} } }));
///
/// let mut hits = scan(client, options);
/// while let Some(hit) = hits.next().await {
///     println!("{}", hit?["_id"]);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ScanIterator<T: Transport + ?Sized + 'static> {
    client: Arc<T>,
    options: ScanOptions,
    state: State,
    hits: VecDeque<Value>,
    pending_error: Option<BulkError>,
    cursor: ScrollGuard<T>,
}

/// Scan everything `options` selects; see [`ScanIterator`].
pub fn scan<T>(client: Arc<T>, options: ScanOptions) -> ScanIterator<T>
where
    T: Transport + ?Sized + 'static,
{
    ScanIterator {
        cursor: ScrollGuard::new(client.clone()),
        client,
        options,
        state: State::Init,
        hits: VecDeque::new(),
        pending_error: None,
    }
}

impl<T: Transport + ?Sized + 'static> ScanIterator<T> {
    /// The options this scan runs with.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Id of the live cursor, if any.
    pub fn scroll_id(&self) -> Option<&str> {
        self.cursor.get()
    }

    /// Next hit, or `None` once the scan is exhausted.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        loop {
            if let Some(hit) = self.hits.pop_front() {
                return Some(Ok(hit));
            }
            if let Some(error) = self.pending_error.take() {
                self.finish().await;
                return Some(Err(error));
            }

            let response = match self.state {
                State::Done => return None,
                State::Init => {
                    self.state = State::Streaming;
                    let request = self.options.search_request();
                    debug!("Starting scan over {:?}", request.index);
                    self.client.search(&request).await
                }
                State::Streaming => match self.cursor.get() {
                    Some(id) => self.client.scroll(id, &self.options.scroll).await,
                    None => {
                        self.finish().await;
                        return None;
                    }
                },
            };

            if let Err(error) = self.load(response).await {
                self.finish().await;
                return Some(Err(error));
            }
        }
    }

    /// Stop early and release the cursor.
    pub async fn close(&mut self) {
        self.hits.clear();
        self.pending_error = None;
        self.finish().await;
    }

    /// Turn into a [`Stream`] of hits.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send + 'static {
        stream::unfold(self, |mut scan| async move {
            scan.next().await.map(|item| (item, scan))
        })
    }

    async fn load(&mut self, response: std::result::Result<Value, TransportError>) -> Result<()> {
        let page = ScrollPage::from_response(response?)?;

        // a missing id leaves the previous cursor in place for clearing
        let has_cursor = page.scroll_id.is_some();
        if let Some(id) = page.scroll_id {
            self.cursor.set(id);
        }

        if !has_cursor || page.hits.is_empty() {
            debug!("Scan finished");
            self.finish().await;
            return Ok(());
        }

        debug!("Scan page with {} hits", page.hits.len());
        self.hits.extend(page.hits);

        let shards = page.shards;
        if !shards.is_complete() {
            let message = format!(
                "Scroll request has only succeeded on {} (+{} skipped) shards out of {}.",
                shards.successful, shards.skipped, shards.total
            );
            warn!(
                scroll_id = self.cursor.get().unwrap_or_default(),
                "{}", message
            );
            if self.options.raise_on_error {
                self.pending_error = Some(
                    ScanError {
                        scroll_id: self.cursor.get().map(str::to_string),
                        message,
                    }
                    .into(),
                );
            }
        }
        Ok(())
    }

    async fn finish(&mut self) {
        self.state = State::Done;
        if self.options.clear_scroll {
            self.cursor.clear().await;
        } else {
            self.cursor.disarm();
        }
    }
}
