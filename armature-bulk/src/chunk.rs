//! Grouping expanded actions into size-bounded batches.

use crate::action::ExpandedAction;
use serde_json::Value;

/// An ordered group of actions sent in one bulk request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    items: Vec<ExpandedAction>,
    size: usize,
}

impl Batch {
    /// Number of actions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no actions.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialized size in bytes.
    pub fn byte_size(&self) -> usize {
        self.size
    }

    /// The actions, in request order.
    pub fn items(&self) -> &[ExpandedAction] {
        &self.items
    }

    /// Consume into the actions.
    pub fn into_items(self) -> Vec<ExpandedAction> {
        self.items
    }
}

/// NDJSON lines for a run of actions.
pub(crate) fn bulk_body(items: &[ExpandedAction]) -> Vec<Value> {
    let mut body = Vec::with_capacity(items.len() * 2);
    for item in items {
        item.write_lines(&mut body);
    }
    body
}

/// Accumulates actions and hands out full batches.
///
/// A batch is closed when it already holds `max_count` actions or when the
/// next action would push it past `max_bytes`. An action bigger than
/// `max_bytes` on its own still gets a batch of its own.
#[derive(Debug, Clone)]
pub struct ChunkBuffer {
    max_count: usize,
    max_bytes: usize,
    current: Batch,
}

impl ChunkBuffer {
    /// Create a buffer. A `max_count` of zero is treated as one.
    pub fn new(max_count: usize, max_bytes: usize) -> Self {
        Self {
            max_count: max_count.max(1),
            max_bytes,
            current: Batch::default(),
        }
    }

    /// Add an action, returning the previous batch if it had to be closed.
    pub fn push(&mut self, action: ExpandedAction) -> Option<Batch> {
        let size = action.byte_size();
        let full = !self.current.is_empty()
            && (self.current.size + size > self.max_bytes
                || self.current.len() >= self.max_count);

        let closed = if full { self.flush() } else { None };

        self.current.size += size;
        self.current.items.push(action);
        closed
    }

    /// Take whatever is buffered.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

/// Lazy iterator of batches over a sequence of expanded actions.
#[derive(Debug)]
pub struct Chunks<I> {
    actions: I,
    buffer: ChunkBuffer,
}

impl<I> Iterator for Chunks<I>
where
    I: Iterator<Item = ExpandedAction>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        for action in self.actions.by_ref() {
            if let Some(batch) = self.buffer.push(action) {
                return Some(batch);
            }
        }
        self.buffer.flush()
    }
}

/// Split `actions` into batches of at most `max_count` actions and
/// `max_bytes` serialized bytes.
pub fn chunk_actions<I>(actions: I, max_count: usize, max_bytes: usize) -> Chunks<I::IntoIter>
where
    I: IntoIterator<Item = ExpandedAction>,
{
    Chunks {
        actions: actions.into_iter(),
        buffer: ChunkBuffer::new(max_count, max_bytes),
    }
}
