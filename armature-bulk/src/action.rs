//! Bulk actions and their expansion into command/payload pairs.

use crate::error::{BulkError, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::fmt;

/// Metadata keys moved from an action into its bulk command line.
const META_KEYS: &[&str] = &[
    "_id",
    "_index",
    "_if_seq_no",
    "_if_primary_term",
    "_retry_on_conflict",
    "_routing",
    "_version",
    "_version_type",
    "if_seq_no",
    "if_primary_term",
    "pipeline",
    "require_alias",
    "retry_on_conflict",
    "routing",
    "version",
    "version_type",
];

/// Metadata keys that lose their leading underscore on the command line.
const UNDERSCORED_KEYS: &[&str] = &[
    "_if_seq_no",
    "_if_primary_term",
    "_retry_on_conflict",
    "_routing",
    "_version",
    "_version_type",
];

/// Bulk operation type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum OpType {
    /// Index a document, replacing any existing one.
    #[default]
    Index,
    /// Create a document (fail if exists).
    Create,
    /// Update a document.
    Update,
    /// Delete a document.
    Delete,
    /// Operation name the helpers do not know; passed through to the store.
    Other(String),
}

impl OpType {
    /// Parse an operation name.
    pub fn parse(name: &str) -> Self {
        match name {
            "index" => OpType::Index,
            "create" => OpType::Create,
            "update" => OpType::Update,
            "delete" => OpType::Delete,
            other => OpType::Other(other.to_string()),
        }
    }

    /// Wire name of the operation.
    pub fn as_str(&self) -> &str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
            OpType::Other(name) => name,
        }
    }
}

impl Serialize for OpType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logical write.
///
/// Actions are JSON mappings: `_op_type`, `_index`, `_id` and the
/// write-control keys (`routing`, `version`, `retry_on_conflict`, ...) are
/// metadata, `_source` is the document body. When `_source` is missing the
/// remaining keys form the body.
///
/// A pre-serialized document (JSON text or bytes) becomes a plain `index`
/// action whose body is the parsed document, taken as is: keys such as
/// `_id` inside it stay in the body.
///
/// ```rust
/// use armature_bulk::{Action, OpType};
/// use serde_json::json;
///
/// let action = Action::index("articles", json!({ "title": "Hello" })).with_id("1");
/// assert_eq!(action.op_type(), OpType::Index);
///
/// let raw = Action::try_from(json!({ "_id": 1, "answer": 42 })).unwrap();
/// assert_eq!(raw.op_type(), OpType::Index);
///
/// let text = Action::try_from(r#"{"answer": 42}"#).unwrap();
/// assert_eq!(text.get("_source"), Some(&json!({ "answer": 42 })));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Map<String, Value>);

impl Action {
    fn with_op(op_type: OpType, index: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("_op_type".to_string(), Value::String(op_type.as_str().to_string()));
        map.insert("_index".to_string(), Value::String(index.into()));
        Self(map)
    }

    /// Index `doc` into `index`.
    pub fn index(index: impl Into<String>, doc: Value) -> Self {
        Self::with_op(OpType::Index, index).with_source(doc)
    }

    /// Create `doc` in `index`, failing if the id already exists.
    pub fn create(index: impl Into<String>, doc: Value) -> Self {
        Self::with_op(OpType::Create, index).with_source(doc)
    }

    /// Partially update document `id` with `partial`.
    pub fn update(index: impl Into<String>, id: impl Into<Value>, partial: Value) -> Self {
        Self::with_op(OpType::Update, index)
            .with_id(id)
            .with_source(json!({ "doc": partial }))
    }

    /// Delete document `id`.
    pub fn delete(index: impl Into<String>, id: impl Into<Value>) -> Self {
        Self::with_op(OpType::Delete, index).with_id(id)
    }

    /// Index a pre-serialized document into the default index.
    pub fn from_json(text: &str) -> Result<Self> {
        let source: Value = serde_json::from_str(text)?;
        Ok(Self::default().with_source(source))
    }

    /// Set the document id.
    pub fn with_id(self, id: impl Into<Value>) -> Self {
        self.with_meta("_id", id)
    }

    /// Set the document body.
    pub fn with_source(self, source: Value) -> Self {
        self.with_meta("_source", source)
    }

    /// Set the routing key.
    pub fn with_routing(self, routing: impl Into<String>) -> Self {
        self.with_meta("routing", Value::String(routing.into()))
    }

    /// Set an external version.
    pub fn with_version(self, version: i64) -> Self {
        self.with_meta("version", version)
    }

    /// Retry update conflicts on the server this many times.
    pub fn with_retry_on_conflict(self, retries: u32) -> Self {
        self.with_meta("retry_on_conflict", retries)
    }

    /// Run the document through an ingest pipeline.
    pub fn with_pipeline(self, pipeline: impl Into<String>) -> Self {
        self.with_meta("pipeline", Value::String(pipeline.into()))
    }

    /// Set an arbitrary key.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// The operation type, `index` when unset.
    pub fn op_type(&self) -> OpType {
        self.0
            .get("_op_type")
            .and_then(Value::as_str)
            .map(OpType::parse)
            .unwrap_or_default()
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The underlying mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying mapping.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Action {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<&str> for Action {
    type Error = BulkError;

    fn try_from(text: &str) -> Result<Self> {
        Self::from_json(text)
    }
}

impl TryFrom<&[u8]> for Action {
    type Error = BulkError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let source: Value = serde_json::from_slice(bytes)?;
        Ok(Self::default().with_source(source))
    }
}

impl TryFrom<Value> for Action {
    type Error = BulkError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::String(text) => Self::from_json(&text),
            other => Err(BulkError::Validation(format!(
                "bulk action must be a JSON object, got {other}"
            ))),
        }
    }
}

/// An action split into its bulk command line and optional payload line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedAction {
    op_type: OpType,
    meta: Map<String, Value>,
    payload: Option<Value>,
    size: usize,
}

impl ExpandedAction {
    /// Build an expanded action. Delete operations never carry a payload.
    pub fn new(op_type: OpType, meta: Map<String, Value>, payload: Option<Value>) -> Self {
        let payload = if op_type == OpType::Delete {
            None
        } else {
            Some(payload.unwrap_or_else(|| Value::Object(Map::new())))
        };

        let mut action = Self {
            op_type,
            meta,
            payload,
            size: 0,
        };
        action.size = action.command().to_string().len()
            + 1
            + action.payload.as_ref().map_or(0, |p| p.to_string().len() + 1);
        action
    }

    /// Operation type.
    pub fn op_type(&self) -> &OpType {
        &self.op_type
    }

    /// Command metadata (`_index`, `_id`, `routing`, ...).
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// The `{op_type: {metadata}}` command line.
    pub fn command(&self) -> Value {
        let mut command = Map::new();
        command.insert(self.op_type.as_str().to_string(), Value::Object(self.meta.clone()));
        Value::Object(command)
    }

    /// Document payload; `None` for deletes.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Serialized size in bytes, newlines included.
    pub fn byte_size(&self) -> usize {
        self.size
    }

    /// Document id, rendered as a string.
    pub fn id(&self) -> Option<String> {
        self.meta.get("_id").map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Target index, if the action names one.
    pub fn index(&self) -> Option<String> {
        self.meta.get("_index").and_then(Value::as_str).map(str::to_string)
    }

    /// Append the NDJSON lines for this action to `body`.
    pub(crate) fn write_lines(&self, body: &mut Vec<Value>) {
        body.push(self.command());
        if let Some(payload) = &self.payload {
            body.push(payload.clone());
        }
    }
}

/// Expand an action into its command line and payload.
///
/// The caller's action is left untouched.
pub fn expand_action(action: &Action) -> ExpandedAction {
    let mut data = action.as_map().clone();

    let op_type = match data.remove("_op_type") {
        Some(Value::String(name)) => OpType::parse(&name),
        Some(other) => OpType::parse(&other.to_string()),
        None => OpType::Index,
    };

    let mut meta = Map::new();
    for &key in META_KEYS {
        if let Some(value) = data.remove(key) {
            let name = if UNDERSCORED_KEYS.contains(&key) {
                &key[1..]
            } else {
                key
            };
            meta.insert(name.to_string(), value);
        }
    }

    if op_type == OpType::Delete {
        return ExpandedAction::new(op_type, meta, None);
    }

    let payload = match data.remove("_source") {
        Some(source) => source,
        None => Value::Object(data),
    };

    ExpandedAction::new(op_type, meta, Some(payload))
}
