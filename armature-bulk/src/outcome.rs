//! Per-item results of a bulk request.

use crate::{
    action::{ExpandedAction, OpType},
    error::{BulkError, Result, TransportError},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The store rejected this item (non-2xx item status).
    Item,
    /// The whole request failed and the item never got a status of its own.
    Transport,
}

/// Details about one item of a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetail {
    /// Operation type.
    pub op_type: OpType,
    /// Document id.
    pub id: Option<String>,
    /// Index name.
    pub index: Option<String>,
    /// HTTP status code; `None` when the request never reached the store.
    pub status: Option<u16>,
    /// Result reported by the store (`created`, `updated`, ...).
    pub result: Option<String>,
    /// Document version.
    pub version: Option<i64>,
    /// Error details.
    pub error: Option<Value>,
    /// The payload that was sent, kept on failures for inspection or retry.
    pub data: Option<Value>,
}

/// The outcome of one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The store accepted the action.
    Success(ItemDetail),
    /// The action failed.
    Failure(FailureKind, ItemDetail),
}

impl Outcome {
    /// Check if the operation was successful.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Item details.
    pub fn detail(&self) -> &ItemDetail {
        match self {
            Outcome::Success(detail) | Outcome::Failure(_, detail) => detail,
        }
    }

    /// Consume into the item details.
    pub fn into_detail(self) -> ItemDetail {
        match self {
            Outcome::Success(detail) | Outcome::Failure(_, detail) => detail,
        }
    }

    /// Failure kind, `None` on success.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(kind, _) => Some(*kind),
        }
    }

    /// HTTP status of the item.
    pub fn status(&self) -> Option<u16> {
        self.detail().status
    }

    /// Document id.
    pub fn id(&self) -> Option<&str> {
        self.detail().id.as_deref()
    }

    /// Whether the store throttled this item.
    pub fn is_throttled(&self) -> bool {
        !self.is_ok() && self.status() == Some(429)
    }

    /// Failure standing in for `item` after the whole request failed.
    pub(crate) fn from_transport_error(item: &ExpandedAction, error: &TransportError) -> Self {
        Outcome::Failure(
            FailureKind::Transport,
            ItemDetail {
                op_type: item.op_type().clone(),
                id: item.id(),
                index: item.index(),
                status: error.status,
                result: None,
                version: None,
                error: Some(Value::String(error.message.clone())),
                data: item.payload().cloned(),
            },
        )
    }
}

/// Bulk operation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponse {
    /// Time taken in milliseconds.
    #[serde(default)]
    pub took: u64,
    /// Whether there were errors.
    #[serde(default)]
    pub errors: bool,
    /// Individual item results, each a single-key `{op_type: status}` map.
    pub items: Vec<Map<String, Value>>,
}

/// Status of a bulk item operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemStatus {
    /// Index name.
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    /// Document ID.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// Document version.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// Result status.
    #[serde(default)]
    pub result: Option<String>,
    /// HTTP status code; a missing status counts as a server error.
    #[serde(default = "missing_status")]
    pub status: u16,
    /// Error details.
    #[serde(default)]
    pub error: Option<Value>,
}

fn missing_status() -> u16 {
    500
}

impl BulkItemStatus {
    /// Check if the operation was successful.
    pub fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Pair the items of a bulk response with the actions that produced them.
///
/// The store answers in request order, so the n-th response item belongs to
/// the n-th request item.
pub(crate) fn pair_response(response: Value, items: &[ExpandedAction]) -> Result<Vec<Outcome>> {
    let response: BulkResponse = serde_json::from_value(response)?;

    if response.items.len() != items.len() {
        return Err(BulkError::Transport {
            status: None,
            message: format!(
                "malformed bulk response: sent {} actions, got {} results",
                items.len(),
                response.items.len()
            ),
        });
    }

    response
        .items
        .into_iter()
        .zip(items)
        .map(|(result, item)| {
            let (op_type, status) = result.into_iter().next().ok_or_else(|| {
                BulkError::Transport {
                    status: None,
                    message: "malformed bulk response: empty result item".to_string(),
                }
            })?;
            let status: BulkItemStatus = serde_json::from_value(status)?;
            let ok = status.is_success();

            let detail = ItemDetail {
                op_type: OpType::parse(&op_type),
                id: status.id.or_else(|| item.id()),
                index: status.index.or_else(|| item.index()),
                status: Some(status.status),
                result: status.result,
                version: status.version,
                error: status.error,
                data: if ok { None } else { item.payload().cloned() },
            };

            Ok(if ok {
                Outcome::Success(detail)
            } else {
                Outcome::Failure(FailureKind::Item, detail)
            })
        })
        .collect()
}
