//! Exponential backoff for throttled bulk items.
//!
//! When the store answers an item (or a whole request) with `429 Too Many
//! Requests`, only the throttled items are sent again, after a delay that
//! doubles every round up to a cap. Everything else is final after the
//! first round.

use crate::{
    action::{Action, ExpandedAction},
    config::BulkOptions,
    error::Result,
    executor::BatchExecutor,
    outcome::Outcome,
    streaming::StreamingBulk,
    transport::Transport,
};
use std::time::Duration;
use tracing::warn;

/// Retry limits and delays for throttled items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Maximum number of retry rounds; `None` retries until the store
    /// stops throttling.
    pub max_retries: Option<u32>,
    /// Delay before the first retry round.
    pub initial: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_retries: Some(0),
            initial: Duration::from_secs(2),
            max: Duration::from_secs(600),
        }
    }
}

impl Backoff {
    /// Retry up to `max_retries` rounds.
    pub fn new(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries: Some(max_retries),
            initial,
            max,
        }
    }

    /// Retry without limit.
    pub fn unlimited(initial: Duration, max: Duration) -> Self {
        Self {
            max_retries: None,
            initial,
            max,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay before retry round `retry` (1-based): `initial * 2^(retry - 1)`,
    /// capped at `max`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Whether retry round `retry` is allowed.
    pub fn allows(&self, retry: u32) -> bool {
        self.max_retries.is_none_or(|max| retry <= max)
    }
}

/// Result of one round of a batch.
#[derive(Debug, Default)]
pub(crate) struct Round {
    /// Outcomes that will not be retried.
    pub finished: Vec<Outcome>,
    /// Throttled actions queued for the next round.
    pub throttled: Vec<ExpandedAction>,
}

/// Run round `retry` of a batch: wait out the backoff delay (rounds after
/// the first), send `items`, and split the outcomes into final ones and
/// throttled actions that may go again.
pub(crate) async fn run_round<C>(
    executor: &BatchExecutor<'_, C>,
    items: Vec<ExpandedAction>,
    retry: u32,
    backoff: &Backoff,
) -> Result<Round>
where
    C: Transport + ?Sized,
{
    if retry > 0 {
        let delay = backoff.delay_for_retry(retry);
        warn!(
            retry,
            items = items.len(),
            delay_ms = delay.as_millis() as u64,
            "Retrying throttled bulk items"
        );
        tokio::time::sleep(delay).await;
    }

    let outcomes = executor.send(&items, backoff.allows(retry + 1)).await?;

    let mut round = Round::default();
    for (item, outcome) in items.into_iter().zip(outcomes) {
        if outcome.is_throttled() && backoff.allows(retry + 1) {
            round.throttled.push(item);
        } else {
            round.finished.push(outcome);
        }
    }
    Ok(round)
}

/// Stream `actions` with backoff on throttling, yielding only the items that
/// ultimately failed.
///
/// Items are never raised as [`BulkIndexError`](crate::BulkIndexError); a
/// transport error ends the stream, unless it is a 429 and a retry round
/// is left.
///
/// ```rust,no_run
/// use armature_bulk::{backoff_bulk, Action, Backoff, BulkOptions, OpenSearchClient, OpenSearchConfig};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> armature_bulk::Result<()> {
/// let client = OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?;
/// let actions = (0..1000).map(|i| Action::index("logs", json!({ "n": i })));
/// let options = BulkOptions::default()
///     .with_backoff(Backoff::new(5, Duration::from_secs(1), Duration::from_secs(60)));
///
/// let mut failures = backoff_bulk(&client, actions, options);
/// while let Some(failure) = failures.next().await {
///     eprintln!("failed: {:?}", failure?);
/// }
/// # Ok(())
/// # }
/// ```
pub fn backoff_bulk<'s, C, I>(client: C, actions: I, options: BulkOptions) -> StreamingBulk<'s, C>
where
    C: Transport + 's,
    I: IntoIterator<Item = Action>,
    I::IntoIter: Send + 's,
{
    let options = options
        .with_raise_on_error(false)
        .with_raise_on_exception(true)
        .with_yield_ok(false);
    StreamingBulk::from_actions(client, actions, options)
}
