//! Category snapshot artifact
//!
//! JSON document written by `backup` and read by `rollback`:
//!
//! ```json
//! {
//!   "metadata": { "createdTimestamp": "2025-03-09T14:05:07Z", "itemCount": 2 },
//!   "items": [
//!     { "id": "…", "categoryName": "Toys", "parentId": null,
//!       "displayOrder": 0, "description": "", "isActive": true }
//!   ]
//! }
//! ```

use crate::models::Category;
use crate::services::error::CatalogServiceError;
use crate::services::hierarchy::{find_cycle_members, ParentMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub created_timestamp: DateTime<Utc>,
    pub item_count: u64,
}

/// One category as captured by a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotItem {
    pub id: String,
    pub category_name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub display_order: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<&Category> for SnapshotItem {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.clone(),
            category_name: category.name.clone(),
            parent_id: category.parent_id.clone(),
            display_order: category.display_order,
            description: category.description.clone(),
            is_active: category.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub metadata: SnapshotMetadata,
    pub items: Vec<SnapshotItem>,
}

impl CategorySnapshot {
    pub fn from_categories(categories: &[Category], created: DateTime<Utc>) -> Self {
        let items: Vec<SnapshotItem> = categories.iter().map(SnapshotItem::from).collect();
        Self {
            metadata: SnapshotMetadata {
                created_timestamp: created,
                item_count: items.len() as u64,
            },
            items,
        }
    }

    pub fn to_json(&self) -> Result<String, CatalogServiceError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CatalogServiceError::serialization(format!("Failed to encode snapshot: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogServiceError> {
        serde_json::from_str(json)
            .map_err(|e| CatalogServiceError::serialization(format!("Invalid snapshot: {}", e)))
    }

    /// Write the snapshot, creating parent directories as needed
    pub async fn write_to(&self, path: &Path) -> Result<(), CatalogServiceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CatalogServiceError::io(parent, e))?;
            }
        }
        let json = self.to_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| CatalogServiceError::io(path, e))
    }

    pub async fn read_from(path: &Path) -> Result<Self, CatalogServiceError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CatalogServiceError::io(path, e))?;
        Self::from_json(&json)
    }

    /// Reject snapshots that cannot be restored cleanly
    ///
    /// Checks the item count, blank and duplicate ids/names, and parent
    /// cycles. Runs before rollback deletes anything.
    pub fn validate(&self) -> Result<(), CatalogServiceError> {
        if self.metadata.item_count != self.items.len() as u64 {
            return Err(CatalogServiceError::serialization(format!(
                "snapshot declares {} items but contains {}",
                self.metadata.item_count,
                self.items.len()
            )));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for item in &self.items {
            if item.id.trim().is_empty() || item.category_name.trim().is_empty() {
                return Err(CatalogServiceError::serialization(
                    "snapshot item with blank id or name",
                ));
            }
            if !ids.insert(item.id.as_str()) {
                return Err(CatalogServiceError::serialization(format!(
                    "duplicate category id in snapshot: {}",
                    item.id
                )));
            }
            if !names.insert(item.category_name.as_str()) {
                return Err(CatalogServiceError::serialization(format!(
                    "duplicate category name in snapshot: {}",
                    item.category_name
                )));
            }
        }

        let cycle = find_cycle_members(&self.parent_map());
        if !cycle.is_empty() {
            return Err(CatalogServiceError::cycle(format!(
                "snapshot contains a parent cycle through: {}",
                cycle.join(", ")
            )));
        }

        Ok(())
    }

    pub fn parent_map(&self) -> ParentMap {
        self.items
            .iter()
            .map(|item| (item.id.clone(), item.parent_id.clone()))
            .collect()
    }

    /// Items whose parent id is not in the snapshot
    pub fn dangling_parents(&self) -> Vec<&SnapshotItem> {
        let ids: HashSet<&str> = self.items.iter().map(|item| item.id.as_str()).collect();
        self.items
            .iter()
            .filter(|item| {
                item.parent_id
                    .as_deref()
                    .is_some_and(|parent| !ids.contains(parent))
            })
            .collect()
    }
}
