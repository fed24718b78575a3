//! Parallel bulk indexing over a pool of worker tasks.
//!
//! A producer task feeds the caller's actions into a bounded queue. Each of
//! `thread_count` workers pulls from that queue and runs its own
//! [`StreamingBulk`], so at most `thread_count` bulk requests are in flight.
//! Outcomes from all workers meet in one output queue; their order across
//! workers follows completion, not input.

use crate::{
    action::Action,
    config::BulkOptions,
    error::{BulkError, Result},
    outcome::Outcome,
    streaming::StreamingBulk,
    transport::Transport,
};
use futures::{Stream, stream};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Action>>>;

/// Handle on a running parallel bulk job.
///
/// Dropping the handle cancels the job: the producer stops and workers wind
/// down once their current request completes.
pub struct ParallelBulk {
    outcomes: mpsc::UnboundedReceiver<Result<Outcome>>,
    producer: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

/// Index `actions` with `options.thread_count` concurrent workers.
///
/// Must be called from within a tokio runtime.
///
/// ```rust,no_run
/// use armature_bulk::{parallel_bulk, Action, BulkOptions, OpenSearchClient, OpenSearchConfig};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> armature_bulk::Result<()> {
/// let client = Arc::new(OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?);
/// let actions: Vec<Action> = (0..100_000)
///     .map(|i| Action::index("logs", json!({ "n": i })))
///     .collect();
///
/// let mut job = parallel_bulk(client, actions, BulkOptions::default().with_thread_count(8));
/// while let Some(outcome) = job.next().await {
///     outcome?;
/// }
/// # Ok(())
/// # }
/// ```
pub fn parallel_bulk<T, I>(client: Arc<T>, actions: I, options: BulkOptions) -> ParallelBulk
where
    T: Transport + ?Sized + 'static,
    I: IntoIterator<Item = Action>,
    I::IntoIter: Send + 'static,
{
    let thread_count = options.thread_count.max(1);
    let capacity = options.queue_size.max(1).saturating_mul(options.chunk_size.max(1));

    let (input_tx, input_rx) = mpsc::channel::<Action>(capacity);
    let input_rx: SharedReceiver = Arc::new(Mutex::new(input_rx));
    let (output_tx, outcomes) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));

    debug!(thread_count, capacity, "Starting parallel bulk workers");

    let producer = {
        let cancelled = cancelled.clone();
        let actions = actions.into_iter();
        tokio::spawn(async move {
            for action in actions {
                if cancelled.load(Ordering::Acquire) {
                    debug!("Parallel bulk cancelled, producer stopping");
                    break;
                }
                if input_tx.send(action).await.is_err() {
                    break;
                }
            }
            // dropping input_tx closes the queue
        })
    };

    let workers = (0..thread_count)
        .map(|id| {
            spawn_worker(
                id,
                client.clone(),
                input_rx.clone(),
                output_tx.clone(),
                cancelled.clone(),
                options.clone(),
            )
        })
        .collect();

    ParallelBulk {
        outcomes,
        producer: Some(producer),
        workers,
        cancelled,
        finished: false,
    }
}

fn queue_stream(queue: SharedReceiver) -> impl Stream<Item = Action> + Send + 'static {
    stream::unfold(queue, |queue| async move {
        let action = queue.lock().await.recv().await;
        action.map(|action| (action, queue))
    })
}

fn spawn_worker<T>(
    id: usize,
    client: Arc<T>,
    queue: SharedReceiver,
    output: mpsc::UnboundedSender<Result<Outcome>>,
    cancelled: Arc<AtomicBool>,
    options: BulkOptions,
) -> JoinHandle<()>
where
    T: Transport + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut bulk = StreamingBulk::from_stream(client, queue_stream(queue), options);

        while let Some(item) = bulk.next().await {
            let failed = item.is_err();
            if let Err(error) = &item {
                warn!(worker = id, "Parallel bulk worker failed: {}", error);
                cancelled.store(true, Ordering::Release);
            }
            if output.send(item).is_err() {
                cancelled.store(true, Ordering::Release);
                break;
            }
            if failed {
                break;
            }
        }

        debug!(worker = id, "Parallel bulk worker stopped");
    })
}

impl ParallelBulk {
    /// Next outcome from any worker, or `None` once every worker is done.
    ///
    /// A worker error is yielded as soon as it happens; the remaining workers
    /// finish what is already queued.
    pub async fn next(&mut self) -> Option<Result<Outcome>> {
        if self.finished {
            return None;
        }

        match self.outcomes.recv().await {
            Some(item) => Some(item),
            None => {
                self.finished = true;
                self.join().await.err().map(Err)
            }
        }
    }

    /// Whether a worker failed or the job was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop feeding new actions to the workers.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Turn into a [`Stream`] of outcomes.
    pub fn into_stream(self) -> impl Stream<Item = Result<Outcome>> + Send + 'static {
        stream::unfold(self, |mut job| async move {
            job.next().await.map(|item| (item, job))
        })
    }

    async fn join(&mut self) -> Result<()> {
        let mut result = Ok(());
        let handles = self.producer.take().into_iter().chain(self.workers.drain(..));

        for handle in handles {
            if let Err(e) = handle.await {
                if result.is_ok() {
                    result = Err(BulkError::Worker(e.to_string()));
                }
            }
        }
        result
    }
}

impl Drop for ParallelBulk {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}
