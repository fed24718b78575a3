//! Streaming bulk indexing.

use crate::{
    action::{Action, ExpandedAction},
    backoff::run_round,
    chunk::{Batch, ChunkBuffer},
    config::BulkOptions,
    error::{BulkError, BulkIndexError, Result},
    executor::BatchExecutor,
    outcome::Outcome,
    transport::Transport,
};
use futures::{Stream, StreamExt, stream};
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, info};

type ActionStream<'s> = Pin<Box<dyn Stream<Item = Result<Action>> + Send + 's>>;

/// A batch whose items are still being sent, possibly over several rounds.
struct InFlight {
    items: Vec<ExpandedAction>,
    retry: u32,
    errors: Vec<Outcome>,
}

/// Lazily indexes a sequence of actions, one batch at a time.
///
/// Each call to [`next`](Self::next) yields the next [`Outcome`], sending a
/// new bulk request whenever the previous batch is used up. With
/// `raise_on_error` the successes of a batch are yielded first and the
/// batch's failures then arrive together as one
/// [`BulkIndexError`](crate::BulkIndexError), after which the stream ends.
///
/// ```rust,no_run
/// use armature_bulk::{streaming_bulk, Action, BulkOptions, OpenSearchClient, OpenSearchConfig};
/// use serde_json::json;
///
/// # async fn example() -> armature_bulk::Result<()> {
/// let client = OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?;
/// let actions = (0..10_000).map(|i| Action::index("logs", json!({ "n": i })).with_id(i));
///
/// let mut stream = streaming_bulk(&client, actions, BulkOptions::default().with_chunk_size(1000));
/// while let Some(outcome) = stream.next().await {
///     let outcome = outcome?;
///     assert!(outcome.is_ok());
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamingBulk<'s, C> {
    client: C,
    options: BulkOptions,
    actions: ActionStream<'s>,
    buffer: ChunkBuffer,
    in_flight: Option<InFlight>,
    pending: VecDeque<Outcome>,
    deferred: Option<BulkError>,
    exhausted: bool,
    done: bool,
}

impl<'s, C> StreamingBulk<'s, C>
where
    C: Transport + 's,
{
    /// Index actions from an async stream.
    pub fn from_stream<S>(client: C, actions: S, options: BulkOptions) -> Self
    where
        S: Stream<Item = Action> + Send + 's,
    {
        Self::try_from_stream(client, actions.map(Ok), options)
    }

    /// Index actions from a fallible stream. The first error ends the
    /// stream; actions buffered but not yet sent are dropped.
    pub fn try_from_stream<S>(client: C, actions: S, options: BulkOptions) -> Self
    where
        S: Stream<Item = Result<Action>> + Send + 's,
    {
        let buffer = ChunkBuffer::new(options.chunk_size, options.max_chunk_bytes);
        Self {
            client,
            options,
            actions: Box::pin(actions),
            buffer,
            in_flight: None,
            pending: VecDeque::new(),
            deferred: None,
            exhausted: false,
            done: false,
        }
    }

    /// Index actions from an iterator.
    pub fn from_actions<I>(client: C, actions: I, options: BulkOptions) -> Self
    where
        I: IntoIterator<Item = Action>,
        I::IntoIter: Send + 's,
    {
        Self::from_stream(client, stream::iter(actions), options)
    }

    /// The options this stream runs with.
    pub fn options(&self) -> &BulkOptions {
        &self.options
    }

    /// Next outcome, or `None` once every action has been reported.
    pub async fn next(&mut self) -> Option<Result<Outcome>> {
        loop {
            if let Some(outcome) = self.pending.pop_front() {
                return Some(Ok(outcome));
            }
            if let Some(error) = self.deferred.take() {
                self.done = true;
                return Some(Err(error));
            }
            if self.done {
                return None;
            }

            let in_flight = match self.in_flight.take() {
                Some(in_flight) => in_flight,
                None => match self.next_batch().await {
                    Ok(Some(batch)) => InFlight {
                        items: batch.into_items(),
                        retry: 0,
                        errors: Vec::new(),
                    },
                    Ok(None) => {
                        self.done = true;
                        return None;
                    }
                    Err(error) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                },
            };

            if let Err(error) = self.send(in_flight).await {
                self.done = true;
                return Some(Err(error));
            }
        }
    }

    /// Turn into a [`Stream`] of outcomes.
    pub fn into_stream(self) -> impl Stream<Item = Result<Outcome>> + Send + 's {
        stream::unfold(self, |mut bulk| async move {
            bulk.next().await.map(|item| (item, bulk))
        })
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        while !self.exhausted {
            match self.actions.next().await {
                Some(action) => {
                    let expanded = self.options.expand(&action?);
                    if let Some(batch) = self.buffer.push(expanded) {
                        return Ok(Some(batch));
                    }
                }
                None => self.exhausted = true,
            }
        }
        Ok(self.buffer.flush())
    }

    async fn send(&mut self, in_flight: InFlight) -> Result<()> {
        let InFlight {
            items,
            retry,
            mut errors,
        } = in_flight;

        let round = {
            let executor = BatchExecutor::new(&self.client, &self.options);
            run_round(&executor, items, retry, &self.options.backoff).await?
        };

        for outcome in round.finished {
            if outcome.is_ok() {
                if self.options.yield_ok {
                    self.pending.push_back(outcome);
                }
            } else if self.options.raises(outcome.status()) {
                errors.push(outcome);
            } else {
                self.pending.push_back(outcome);
            }
        }

        if !round.throttled.is_empty() {
            self.in_flight = Some(InFlight {
                items: round.throttled,
                retry: retry + 1,
                errors,
            });
        } else if !errors.is_empty() {
            debug!("{} document(s) failed to index", errors.len());
            self.deferred = Some(BulkIndexError { errors }.into());
        }

        Ok(())
    }
}

/// Index `actions` lazily; see [`StreamingBulk`].
pub fn streaming_bulk<'s, C, I>(client: C, actions: I, options: BulkOptions) -> StreamingBulk<'s, C>
where
    C: Transport + 's,
    I: IntoIterator<Item = Action>,
    I::IntoIter: Send + 's,
{
    StreamingBulk::from_actions(client, actions, options)
}

/// Totals of a [`bulk`] run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkStats {
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Failed outcomes; empty when only stats were requested.
    pub errors: Vec<Outcome>,
}

impl BulkStats {
    fn record(&mut self, outcome: Outcome, stats_only: bool) {
        if outcome.is_ok() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            if !stats_only {
                self.errors.push(outcome);
            }
        }
    }
}

/// Index `actions` and return the totals.
///
/// Successes are always counted. With `raise_on_error` (the default) the
/// first failing batch aborts the run with a
/// [`BulkIndexError`](crate::BulkIndexError).
pub async fn bulk<'s, C, I>(client: C, actions: I, options: BulkOptions) -> Result<BulkStats>
where
    C: Transport + 's,
    I: IntoIterator<Item = Action>,
    I::IntoIter: Send + 's,
{
    collect_stats(streaming_bulk(client, actions, options.with_yield_ok(true))).await
}

/// Drain a stream into totals.
pub(crate) async fn collect_stats<'s, C>(mut stream: StreamingBulk<'s, C>) -> Result<BulkStats>
where
    C: Transport + 's,
{
    let stats_only = stream.options().stats_only;
    let mut stats = BulkStats::default();

    while let Some(outcome) = stream.next().await {
        stats.record(outcome?, stats_only);
    }

    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Bulk indexing finished"
    );
    Ok(stats)
}
