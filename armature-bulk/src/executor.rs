//! Sending one batch and classifying its items.

use crate::{
    action::ExpandedAction,
    chunk::bulk_body,
    config::BulkOptions,
    error::Result,
    outcome::{Outcome, pair_response},
    transport::Transport,
};
use tracing::{debug, warn};

/// Sends batches to the bulk endpoint and turns the answer into one
/// [`Outcome`] per action.
pub struct BatchExecutor<'a, C: ?Sized> {
    client: &'a C,
    options: &'a BulkOptions,
}

impl<'a, C> BatchExecutor<'a, C>
where
    C: Transport + ?Sized,
{
    /// Create an executor.
    pub fn new(client: &'a C, options: &'a BulkOptions) -> Self {
        Self { client, options }
    }

    /// Send `items` as one bulk request.
    ///
    /// A failed request is returned as an error when `raise_on_exception` is
    /// set, unless its status is ignored; in that case, or when
    /// `raise_on_exception` is off, every item gets a failed outcome carrying
    /// the error.
    pub async fn execute(&self, items: &[ExpandedAction]) -> Result<Vec<Outcome>> {
        self.send(items, false).await
    }

    /// Like [`execute`](Self::execute), but a throttled request (429) is
    /// degraded to per-item failures when `retry_left` is set, so the
    /// backoff loop can send the items again.
    pub(crate) async fn send(
        &self,
        items: &[ExpandedAction],
        retry_left: bool,
    ) -> Result<Vec<Outcome>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Sending bulk request with {} actions", items.len());

        match self.client.bulk(bulk_body(items), &self.options.params).await {
            Ok(response) => pair_response(response, items),
            Err(error) => {
                let ignored = error
                    .status
                    .is_some_and(|s| self.options.ignore_status.contains(&s));
                let retried = retry_left && error.is_throttled();

                if self.options.raise_on_exception && !ignored && !retried {
                    return Err(error.into());
                }

                warn!(
                    status = ?error.status,
                    "Bulk request failed, marking {} actions as failed: {}",
                    items.len(),
                    error.message
                );

                Ok(items
                    .iter()
                    .map(|item| Outcome::from_transport_error(item, &error))
                    .collect())
            }
        }
    }
}
