//! Domain Events for the Catalog
//!
//! Services emit these after a write transaction commits, so subscribers
//! never observe changes that were rolled back.
//!
//! # Architecture
//!
//! Events are emitted using tokio's broadcast channel, allowing multiple subscribers
//! to receive notifications asynchronously. Services hold an optional sender; a
//! service built without one emits nothing.

use crate::models::Category;
use serde::{Deserialize, Serialize};

/// Parent change of a single category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMove {
    pub category_id: String,
    pub old_parent_id: Option<String>,
    pub new_parent_id: Option<String>,
}

/// Domain events emitted by the catalog services
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A new category was created
    CategoryCreated(Category),

    /// Non-structural fields of a category changed
    CategoryUpdated(Category),

    /// A category was re-parented
    CategoryMoved(CategoryMove),

    /// A category and its subtree were removed
    CategoriesDeleted { root_id: String, ids: Vec<String> },

    /// The nested-set columns were recomputed
    TreeIndexRebuilt { rows_written: u64 },

    /// The category table was replaced from a snapshot
    CategoriesRestored { restored: u64 },

    /// A product's category set was replaced
    ProductCategoriesAssigned {
        product_id: String,
        category_ids: Vec<String>,
    },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::CategoryCreated(_) => "category:created",
            DomainEvent::CategoryUpdated(_) => "category:updated",
            DomainEvent::CategoryMoved(_) => "category:moved",
            DomainEvent::CategoriesDeleted { .. } => "category:deleted",
            DomainEvent::TreeIndexRebuilt { .. } => "tree:rebuilt",
            DomainEvent::CategoriesRestored { .. } => "tree:restored",
            DomainEvent::ProductCategoriesAssigned { .. } => "product:categories-assigned",
        }
    }

    /// True for events after which the nested-set columns may be stale
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DomainEvent::CategoryCreated(_)
                | DomainEvent::CategoryMoved(_)
                | DomainEvent::CategoriesDeleted { .. }
                | DomainEvent::CategoriesRestored { .. }
        )
    }
}
