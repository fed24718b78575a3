//! Document trait and helpers.

use crate::{action::Action, error::Result};
use serde::Serialize;
use serde_json::Value;

/// Trait for typed documents that can be turned into bulk actions.
///
/// # Example
///
/// ```rust
/// use armature_bulk::{Document, OpType};
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct Product {
///     name: String,
///     price: f64,
///     category: String,
/// }
///
/// impl Document for Product {
///     fn index_name() -> &'static str {
///         "products"
///     }
///
///     fn routing(&self) -> Option<String> {
///         Some(self.category.clone())
///     }
/// }
///
/// let product = Product {
///     name: "Lamp".to_string(),
///     price: 19.5,
///     category: "lighting".to_string(),
/// };
/// let action = product.index_action("p-1").unwrap();
/// assert_eq!(action.op_type(), OpType::Index);
/// assert_eq!(action.get("routing").unwrap(), "lighting");
/// ```
pub trait Document: Serialize + Send + Sync {
    /// Returns the default index name for this document type.
    fn index_name() -> &'static str;

    /// Returns the routing key for this document (optional).
    fn routing(&self) -> Option<String> {
        None
    }

    /// Index this document under `id`, replacing any existing one.
    fn index_action(&self, id: impl Into<Value>) -> Result<Action> {
        let action = Action::index(Self::index_name(), serde_json::to_value(self)?).with_id(id);
        Ok(self.route(action))
    }

    /// Index this document under an id chosen by the store.
    fn index_action_auto_id(&self) -> Result<Action> {
        let action = Action::index(Self::index_name(), serde_json::to_value(self)?);
        Ok(self.route(action))
    }

    /// Create this document under `id`; fails per item if it exists.
    fn create_action(&self, id: impl Into<Value>) -> Result<Action> {
        let action = Action::create(Self::index_name(), serde_json::to_value(self)?).with_id(id);
        Ok(self.route(action))
    }

    /// Merge this document into the one stored under `id`.
    fn update_action(&self, id: impl Into<Value>) -> Result<Action> {
        let action = Action::update(Self::index_name(), id, serde_json::to_value(self)?);
        Ok(self.route(action))
    }

    /// Delete the document stored under `id`.
    fn delete_action(id: impl Into<Value>) -> Action {
        Action::delete(Self::index_name(), id)
    }

    #[doc(hidden)]
    fn route(&self, action: Action) -> Action {
        match self.routing() {
            Some(routing) => action.with_routing(routing),
            None => action,
        }
    }
}
