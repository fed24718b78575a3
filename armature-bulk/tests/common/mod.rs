//! In-memory transport shared by the integration tests.

#![allow(dead_code)]

use armature_bulk::{SearchRequest, Transport, TransportError, WriteParams};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const SCROLL_ID: &str = "mock-scroll-1";

type BulkHandler = Box<dyn Fn(usize, &[Value]) -> Result<Value, TransportError> + Send + Sync>;

/// One action of a recorded bulk body.
#[derive(Debug, Clone)]
pub struct SentItem {
    pub op_type: String,
    pub meta: Map<String, Value>,
    pub payload: Option<Value>,
}

impl SentItem {
    pub fn id(&self) -> Option<String> {
        self.meta.get("_id").map(render_id)
    }
}

fn render_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Split a bulk body back into actions.
pub fn sent_items(body: &[Value]) -> Vec<SentItem> {
    let mut items = Vec::new();
    let mut lines = body.iter();

    while let Some(command) = lines.next() {
        let (op_type, meta) = command
            .as_object()
            .and_then(|c| c.iter().next())
            .map(|(op, meta)| (op.clone(), meta.as_object().cloned().unwrap_or_default()))
            .expect("command line must be a single-key object");
        let payload = if op_type == "delete" {
            None
        } else {
            lines.next().cloned()
        };
        items.push(SentItem {
            op_type,
            meta,
            payload,
        });
    }
    items
}

/// Build a bulk response giving each item the status chosen by `status`.
pub fn respond(body: &[Value], status: impl Fn(usize, &SentItem) -> u16) -> Value {
    let mut errors = false;
    let items: Vec<Value> = sent_items(body)
        .iter()
        .enumerate()
        .map(|(n, item)| {
            let code = status(n, item);
            let mut result = json!({
                "_index": item.meta.get("_index").cloned().unwrap_or(Value::Null),
                "_id": item.id(),
                "status": code,
            });
            if code >= 300 {
                errors = true;
                result["error"] = json!({ "type": "mock_exception", "reason": format!("status {code}") });
            } else {
                result["result"] = json!(if item.op_type == "delete" { "deleted" } else { "created" });
                result["_version"] = json!(1);
            }

            let mut wrapped = Map::new();
            wrapped.insert(item.op_type.clone(), result);
            Value::Object(wrapped)
        })
        .collect();

    json!({ "took": 1, "errors": errors, "items": items })
}

/// Transport recording every call, answering bulk requests through a
/// handler and scroll requests from a fixed list of documents.
pub struct MockTransport {
    handler: BulkHandler,
    bulk_calls: AtomicUsize,
    bodies: Mutex<Vec<Vec<Value>>>,
    params: Mutex<Vec<WriteParams>>,
    docs: Vec<Value>,
    shard_failure: bool,
    scroll_ids: bool,
    offset: Mutex<usize>,
    page_size: Mutex<usize>,
    searches: Mutex<Vec<SearchRequest>>,
    scrolls: AtomicUsize,
    cleared: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Bulk requests answered by `handler(call_index, body)`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(usize, &[Value]) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            bulk_calls: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
            docs: Vec::new(),
            shard_failure: false,
            scroll_ids: true,
            offset: Mutex::new(0),
            page_size: Mutex::new(10),
            searches: Mutex::new(Vec::new()),
            scrolls: AtomicUsize::new(0),
            cleared: Mutex::new(Vec::new()),
        }
    }

    /// Accepts every item.
    pub fn accepting() -> Self {
        Self::new(|_, body| Ok(respond(body, |_, _| 201)))
    }

    /// Rejects items whose id is in `bad` with a 400.
    pub fn rejecting(bad: &'static [&'static str]) -> Self {
        Self::new(move |_, body| {
            Ok(respond(body, |_, item| {
                if item.id().is_some_and(|id| bad.contains(&id.as_str())) {
                    400
                } else {
                    201
                }
            }))
        })
    }

    /// Serves `count` documents from index `index` through scroll.
    pub fn with_docs(index: &str, count: usize) -> Self {
        let docs = (0..count)
            .map(|n| {
                json!({
                    "_index": index,
                    "_id": n.to_string(),
                    "_score": null,
                    "_source": { "n": n },
                })
            })
            .collect();
        Self {
            docs,
            ..Self::accepting()
        }
    }

    /// Serves the given hits through scroll.
    pub fn with_hits(hits: Vec<Value>) -> Self {
        Self {
            docs: hits,
            ..Self::accepting()
        }
    }

    /// Report one failed shard out of five on every page.
    pub fn failing_shards(mut self) -> Self {
        self.shard_failure = true;
        self
    }

    /// Answer searches without a scroll id.
    pub fn without_scroll_id(mut self) -> Self {
        self.scroll_ids = false;
        self
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Vec<Value>> {
        self.bodies.lock().unwrap().clone()
    }

    /// Write parameters of every bulk call.
    pub fn params(&self) -> Vec<WriteParams> {
        self.params.lock().unwrap().clone()
    }

    /// Every action sent, across all bulk calls.
    pub fn sent(&self) -> Vec<SentItem> {
        self.bodies().iter().flat_map(|body| sent_items(body)).collect()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.searches.lock().unwrap().clone()
    }

    pub fn scroll_calls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }

    fn page(&self) -> Value {
        let size = *self.page_size.lock().unwrap();
        let mut offset = self.offset.lock().unwrap();
        let start = (*offset).min(self.docs.len());
        let end = (start + size).min(self.docs.len());
        *offset = end;

        let shards = if self.shard_failure {
            json!({ "total": 5, "successful": 4, "skipped": 0, "failed": 1 })
        } else {
            json!({ "total": 5, "successful": 5, "skipped": 0, "failed": 0 })
        };

        let mut page = json!({
            "_shards": shards,
            "hits": { "hits": self.docs[start..end].to_vec() },
        });
        if self.scroll_ids {
            page["_scroll_id"] = json!(SCROLL_ID);
        }
        page
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn bulk(&self, body: Vec<Value>, params: &WriteParams) -> Result<Value, TransportError> {
        let call = self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.params.lock().unwrap().push(params.clone());
        self.bodies.lock().unwrap().push(body.clone());
        (self.handler)(call, &body)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Value, TransportError> {
        self.searches.lock().unwrap().push(request.clone());
        *self.offset.lock().unwrap() = 0;
        *self.page_size.lock().unwrap() = request.size.max(1) as usize;
        Ok(self.page())
    }

    async fn scroll(&self, scroll_id: &str, _ttl: &str) -> Result<Value, TransportError> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        if scroll_id != SCROLL_ID {
            return Err(TransportError::new(404, "No search context found"));
        }
        Ok(self.page())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), TransportError> {
        self.cleared.lock().unwrap().push(scroll_id.to_string());
        Ok(())
    }
}

/// `count` index actions for `index` with ids `0..count`.
pub fn index_actions(index: &str, count: usize) -> Vec<armature_bulk::Action> {
    (0..count)
        .map(|n| armature_bulk::Action::index(index, json!({ "n": n })).with_id(n.to_string()))
        .collect()
}
