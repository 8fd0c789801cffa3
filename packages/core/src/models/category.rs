//! Category Data Structures
//!
//! This module defines the `Category` record and the inputs used to create and
//! update it. Categories form a self-referential forest through `parent_id`.
//!
//! # Tree Fields
//!
//! Every category carries a nested-set encoding (`left`, `right`, `tree_id`,
//! `depth`) in [`TreeFields`]. These values are derived data: they are written
//! only by the tree rebuild and go stale after any structural edit. Treat them
//! as advisory until the index has been rebuilt.
//!
//! # Examples
//!
//! ```rust
//! use storefront_core::models::NewCategory;
//!
//! let shoes = NewCategory::new("Shoes")
//!     .with_display_order(2)
//!     .with_description("All footwear");
//! assert!(shoes.validate(200).is_ok());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum length of a category or product name (characters)
pub const MAX_NAME_LENGTH: usize = 200;

/// Validation errors for catalog inputs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' exceeds maximum length of {max} characters")]
    TooLong { field: String, max: usize },

    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),
}

/// Nested-set encoding of a category's position in the forest
///
/// A freshly inserted category has all fields at zero until the next rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeFields {
    pub left: i64,
    pub right: i64,
    pub tree_id: i64,
    pub depth: i64,
}

impl TreeFields {
    /// Interval containment: `self` is a strict ancestor of `other`
    pub fn is_ancestor_of(&self, other: &TreeFields) -> bool {
        self.tree_id == other.tree_id && self.left < other.left && other.right < self.right
    }

    /// Number of descendants encoded by the interval
    pub fn descendant_count(&self) -> i64 {
        ((self.right - self.left - 1) / 2).max(0)
    }

    /// True when the row has never been touched by a rebuild
    pub fn is_unbuilt(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// A product category
///
/// # Fields
///
/// - `id`: Opaque unique identifier (UUID v4)
/// - `name`: Globally unique display name
/// - `parent_id`: Optional parent category (None for roots)
/// - `display_order`: Sibling ordering (ties broken by name)
/// - `image`, `thumbnail_150`, `thumbnail_800`: Opaque image pipeline handles
/// - `tree`: Nested-set fields (derived, see module docs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,

    #[serde(rename = "categoryName")]
    pub name: String,

    pub parent_id: Option<String>,

    pub display_order: u32,

    #[serde(default)]
    pub description: String,

    pub is_active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(rename = "thumbnail150", skip_serializing_if = "Option::is_none")]
    pub thumbnail_150: Option<String>,

    #[serde(rename = "thumbnail800", skip_serializing_if = "Option::is_none")]
    pub thumbnail_800: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub tree: TreeFields,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Every image handle this category references, in column order
    pub fn image_handles(&self) -> impl Iterator<Item = &str> {
        [&self.image, &self.thumbnail_150, &self.thumbnail_800]
            .into_iter()
            .filter_map(|handle| handle.as_deref())
    }
}

/// Category summary returned by the active-category listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: String,
    pub category_name: String,
    pub parent_id: Option<String>,
    #[serde(rename = "thumbnail150")]
    pub thumbnail_150: Option<String>,
    #[serde(rename = "thumbnail800")]
    pub thumbnail_800: Option<String>,
    pub display_order: u32,
}

impl From<&Category> for CategorySummary {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.clone(),
            category_name: category.name.clone(),
            parent_id: category.parent_id.clone(),
            thumbnail_150: category.thumbnail_150.clone(),
            thumbnail_800: category.thumbnail_800.clone(),
            display_order: category.display_order,
        }
    }
}

/// Input for creating a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<String>,
    pub display_order: u32,
    pub description: String,
    pub is_active: bool,
    pub image: Option<String>,
}

impl NewCategory {
    /// Create an active root category input with default ordering
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
            display_order: 0,
            description: String::new(),
            is_active: true,
            image: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_display_order(mut self, display_order: u32) -> Self {
        self.display_order = display_order;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach an uploaded image handle; thumbnails are generated after insert
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Validate the input shape and return the normalized (trimmed) name
    ///
    /// Uniqueness and parent existence need the store and are checked by
    /// `CategoryService`.
    pub fn validate(&self, max_name_length: usize) -> Result<String, ValidationError> {
        if let Some(parent_id) = &self.parent_id {
            if parent_id.trim().is_empty() {
                return Err(ValidationError::InvalidParent(
                    "parent id cannot be blank".to_string(),
                ));
            }
        }
        validate_name("categoryName", &self.name, max_name_length)
    }
}

/// Partial update of a category's non-structural fields
///
/// Re-parenting is deliberately absent: it goes through
/// `CategoryService::set_parent` so cycle and leaf checks always run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<u32>,
    pub is_active: Option<bool>,
}

impl CategoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.display_order.is_none()
            && self.is_active.is_none()
    }
}

/// Validate a display name: trimmed, non-blank, bounded length
///
/// # Examples
///
/// ```
/// use storefront_core::models::validate_name;
///
/// assert_eq!(validate_name("name", "  Toys ", 200).unwrap(), "Toys");
/// assert!(validate_name("name", "   ", 200).is_err());
/// assert!(validate_name("name", "abc", 2).is_err());
/// ```
pub fn validate_name(field: &str, name: &str, max_length: usize) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }

    if trimmed.chars().count() > max_length {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: max_length,
        });
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_category_defaults() {
        let input = NewCategory::new("Toys");
        assert_eq!(input.name, "Toys");
        assert!(input.parent_id.is_none());
        assert_eq!(input.display_order, 0);
        assert!(input.is_active);
        assert!(input.image.is_none());
    }

    #[test]
    fn test_validate_trims_name() {
        let input = NewCategory::new("  Board Games  ");
        assert_eq!(input.validate(MAX_NAME_LENGTH).unwrap(), "Board Games");
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let input = NewCategory::new(" \t ");
        assert_eq!(
            input.validate(MAX_NAME_LENGTH),
            Err(ValidationError::MissingField("categoryName".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_long_name() {
        let input = NewCategory::new("x".repeat(MAX_NAME_LENGTH + 1));
        assert!(matches!(
            input.validate(MAX_NAME_LENGTH),
            Err(ValidationError::TooLong { max, .. }) if max == MAX_NAME_LENGTH
        ));
    }

    #[test]
    fn test_validate_counts_characters_not_bytes() {
        // 200 three-byte characters is still within the limit
        let input = NewCategory::new("玩".repeat(MAX_NAME_LENGTH));
        assert!(input.validate(MAX_NAME_LENGTH).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_parent() {
        let input = NewCategory::new("Toys").with_parent("  ");
        assert!(matches!(
            input.validate(MAX_NAME_LENGTH),
            Err(ValidationError::InvalidParent(_))
        ));
    }

    #[test]
    fn test_tree_fields_containment() {
        let root = TreeFields { left: 1, right: 8, tree_id: 1, depth: 0 };
        let child = TreeFields { left: 2, right: 5, tree_id: 1, depth: 1 };
        let other_tree = TreeFields { left: 2, right: 5, tree_id: 2, depth: 1 };

        assert!(root.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&other_tree));
        assert_eq!(root.descendant_count(), 3);
        assert_eq!(child.descendant_count(), 1);
    }

    #[test]
    fn test_category_serializes_camel_case() {
        let now = Utc::now();
        let category = Category {
            id: "c1".to_string(),
            name: "Toys".to_string(),
            parent_id: None,
            display_order: 1,
            description: String::new(),
            is_active: true,
            image: None,
            thumbnail_150: Some("categories/c1/thumbs/a_150x150.jpg".to_string()),
            thumbnail_800: None,
            created_at: now,
            updated_at: now,
            tree: TreeFields::default(),
        };

        let value = serde_json::to_value(&category).unwrap();
        assert_eq!(value["categoryName"], "Toys");
        assert_eq!(value["displayOrder"], 1);
        assert_eq!(value["thumbnail150"], "categories/c1/thumbs/a_150x150.jpg");
        assert!(value.get("thumbnail800").is_none());
        assert_eq!(value["tree"]["treeId"], 0);
    }
}
