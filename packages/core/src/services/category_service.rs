//! Category Service - Category Store Business Logic
//!
//! Creates, re-parents, updates and deletes categories while keeping two
//! invariants true on every write:
//!
//! - **Acyclic parents**: no category is its own ancestor. Re-parenting walks
//!   upward from the proposed parent with a visited set.
//! - **Leaf rule**: a category never holds directly assigned products and
//!   children at the same time.
//!
//! Every structural mutation runs inside one `BEGIN IMMEDIATE` transaction
//! that covers its validation reads, and sets the tree index dirty flag in
//! that same transaction. The nested-set columns are left untouched.
//!
//! # Examples
//!
//! ```no_run
//! # use storefront_core::db::DatabaseService;
//! # use storefront_core::models::NewCategory;
//! # use storefront_core::services::{CategoryService, DeletePolicy};
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(DatabaseService::new("./data/storefront.db".into()).await?);
//! let categories = CategoryService::new(db);
//!
//! let toys = categories.create_category(NewCategory::new("Toys")).await?;
//! let puzzles = categories
//!     .create_category(NewCategory::new("Puzzles").with_parent(&toys.id))
//!     .await?;
//! categories.set_parent(&puzzles.id, None).await?;
//! categories.delete_category(&toys.id, DeletePolicy::RejectIfProductsInSubtree).await?;
//! # Ok(())
//! # }
//! ```

use crate::db::events::{CategoryMove, DomainEvent};
use crate::db::{category_store, DatabaseService};
use crate::models::{
    validate_name, Category, CategoryUpdate, NewCategory, ValidationError, MAX_NAME_LENGTH,
};
use crate::services::error::CatalogServiceError;
use crate::services::hierarchy::{children_map, collect_descendants, would_create_cycle};
use crate::services::image_pipeline::ImagePipeline;
use chrono::Utc;
use libsql::Connection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What to do with products found in a subtree that is about to be deleted
///
/// Deletion always removes the whole subtree. The policy only decides whether
/// product assignments inside it are allowed to disappear with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Delete the subtree and its product assignments unconditionally
    Cascade,
    /// Fail with an integrity error if any category in the subtree holds products
    RejectIfProductsInSubtree,
}

/// Category store operations
pub struct CategoryService {
    db: Arc<DatabaseService>,
    max_name_length: usize,
    image_pipeline: Option<Arc<dyn ImagePipeline>>,
    /// Where image handles resolve to files; enables file removal on delete
    media_root: Option<PathBuf>,
    /// Optional event sender for broadcasting domain events
    event_tx: Option<broadcast::Sender<DomainEvent>>,
}

impl CategoryService {
    /// Create a CategoryService without thumbnails or event emission
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            db,
            max_name_length: MAX_NAME_LENGTH,
            image_pipeline: None,
            media_root: None,
            event_tx: None,
        }
    }

    pub fn with_max_name_length(mut self, max_name_length: usize) -> Self {
        self.max_name_length = max_name_length;
        self
    }

    /// Generate thumbnails for uploaded images after insert
    pub fn with_image_pipeline(mut self, pipeline: Arc<dyn ImagePipeline>) -> Self {
        self.image_pipeline = Some(pipeline);
        self
    }

    /// Remove image and thumbnail files of deleted categories under `media_root`
    pub fn with_media_root(mut self, media_root: impl Into<PathBuf>) -> Self {
        self.media_root = Some(media_root.into());
        self
    }

    /// Broadcast domain events after each committed mutation
    pub fn with_events(mut self, event_tx: broadcast::Sender<DomainEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    fn emit_event(&self, event: DomainEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Create a category
    ///
    /// # Errors
    ///
    /// - `Validation` if the name is blank, too long, or already used by any
    ///   category (active or inactive)
    /// - `NotFound` if the parent does not exist
    /// - `Integrity` if the parent holds products and so cannot gain a child
    pub async fn create_category(&self, input: NewCategory) -> Result<Category, CatalogServiceError> {
        let name = input.validate(self.max_name_length)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.db.begin_write().await?;
        let result: Result<Category, CatalogServiceError> = async {
            ensure_name_available(&conn, &name, None).await?;

            if let Some(parent_id) = input.parent_id.as_deref() {
                if category_store::get_category(&conn, parent_id).await?.is_none() {
                    return Err(CatalogServiceError::category_not_found(parent_id));
                }
                ensure_can_gain_child(&conn, parent_id).await?;
            }

            category_store::insert_category(
                &conn,
                category_store::DbCreateCategoryParams {
                    id: &id,
                    name: &name,
                    parent_id: input.parent_id.as_deref(),
                    display_order: input.display_order,
                    description: &input.description,
                    is_active: input.is_active,
                    image: input.image.as_deref(),
                    timestamp: &now,
                },
            )
            .await?;
            category_store::mark_index_dirty(&conn).await?;

            fetch_category(&conn, &id).await
        }
        .await;
        let mut category = DatabaseService::finish_write(&conn, result).await?;

        tracing::info!(
            category_id = %category.id,
            parent_id = ?category.parent_id,
            "Created category '{}'",
            category.name
        );

        if let Some(image) = category.image.clone() {
            self.attach_thumbnails(&mut category, &image).await;
        }

        self.emit_event(DomainEvent::CategoryCreated(category.clone()));
        Ok(category)
    }

    /// Best-effort thumbnail generation; failures are logged, never returned
    async fn attach_thumbnails(&self, category: &mut Category, image: &str) {
        let Some(pipeline) = &self.image_pipeline else {
            return;
        };

        let thumbnails = match pipeline.generate_thumbnails(&category.id, image).await {
            Ok(thumbnails) => thumbnails,
            Err(e) => {
                tracing::warn!(
                    category_id = %category.id,
                    "Thumbnail generation failed, continuing without thumbnails: {}",
                    e
                );
                return;
            }
        };

        let stored = async {
            let conn = self.db.connect_with_timeout().await?;
            category_store::update_thumbnails(
                &conn,
                &category.id,
                &thumbnails.thumbnail_150,
                &thumbnails.thumbnail_800,
            )
            .await
        }
        .await;

        match stored {
            Ok(_) => {
                category.thumbnail_150 = Some(thumbnails.thumbnail_150);
                category.thumbnail_800 = Some(thumbnails.thumbnail_800);
            }
            Err(e) => {
                tracing::warn!(
                    category_id = %category.id,
                    "Failed to store thumbnail handles: {}",
                    e
                );
            }
        }
    }

    /// Move a category under `new_parent_id`, or make it a root with `None`
    ///
    /// Moving to the current parent is a no-op and does not dirty the index.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the category or the new parent does not exist
    /// - `Cycle` if the new parent is the category itself or a descendant
    /// - `Integrity` if the new parent holds products
    pub async fn set_parent(
        &self,
        category_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Category, CatalogServiceError> {
        let conn = self.db.begin_write().await?;
        let result: Result<(Category, Option<CategoryMove>), CatalogServiceError> = async {
            let current = fetch_category(&conn, category_id).await?;
            if current.parent_id.as_deref() == new_parent_id {
                return Ok((current, None));
            }

            if let Some(parent_id) = new_parent_id {
                if category_store::get_category(&conn, parent_id).await?.is_none() {
                    return Err(CatalogServiceError::category_not_found(parent_id));
                }

                let parents = category_store::parent_map(&conn).await?;
                if would_create_cycle(&parents, category_id, parent_id) {
                    return Err(CatalogServiceError::cycle(format!(
                        "cannot move category {} under {}: it is the category itself or one of its descendants",
                        category_id, parent_id
                    )));
                }

                ensure_can_gain_child(&conn, parent_id).await?;
            }

            category_store::update_parent(&conn, category_id, new_parent_id).await?;
            category_store::mark_index_dirty(&conn).await?;

            let moved = CategoryMove {
                category_id: category_id.to_string(),
                old_parent_id: current.parent_id.clone(),
                new_parent_id: new_parent_id.map(str::to_string),
            };
            Ok((fetch_category(&conn, category_id).await?, Some(moved)))
        }
        .await;
        let (category, moved) = DatabaseService::finish_write(&conn, result).await?;

        if let Some(moved) = moved {
            tracing::info!(
                category_id = %moved.category_id,
                old_parent = ?moved.old_parent_id,
                new_parent = ?moved.new_parent_id,
                "Moved category"
            );
            self.emit_event(DomainEvent::CategoryMoved(moved));
        }

        Ok(category)
    }

    /// Fail with `Integrity` if the category has both products and children
    pub async fn validate_leaf_rule(&self, category_id: &str) -> Result<(), CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        if category_store::get_category(&conn, category_id).await?.is_none() {
            return Err(CatalogServiceError::category_not_found(category_id));
        }
        check_leaf_rule(&conn, category_id).await
    }

    /// Delete a category and its whole subtree
    ///
    /// Returns the deleted ids, the category first. Product assignments of
    /// deleted categories go with them; the products themselves stay.
    ///
    /// With a media root configured, image and thumbnail files of the
    /// deleted categories are removed after commit. Failures there are
    /// logged only; `cleanup_orphan_images` sweeps anything left behind.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the category does not exist
    /// - `Integrity` under `RejectIfProductsInSubtree` when any category in
    ///   the subtree holds products (nothing is deleted)
    pub async fn delete_category(
        &self,
        category_id: &str,
        policy: DeletePolicy,
    ) -> Result<Vec<String>, CatalogServiceError> {
        let conn = self.db.begin_write().await?;
        let result: Result<(Vec<String>, Vec<String>), CatalogServiceError> = async {
            fetch_category(&conn, category_id).await?;

            let parents = category_store::parent_map(&conn).await?;
            let subtree = collect_descendants(&children_map(&parents), category_id);

            if policy == DeletePolicy::RejectIfProductsInSubtree {
                let mut holding = Vec::new();
                for id in &subtree {
                    if category_store::count_products(&conn, id).await? > 0 {
                        holding.push(id.clone());
                    }
                }
                if !holding.is_empty() {
                    return Err(CatalogServiceError::integrity(format!(
                        "subtree of {} has categories holding products: {}",
                        category_id,
                        holding.join(", ")
                    )));
                }
            }

            let members: HashSet<&str> = subtree.iter().map(String::as_str).collect();
            let handles: Vec<String> = category_store::list_categories(&conn)
                .await?
                .iter()
                .filter(|category| members.contains(category.id.as_str()))
                .flat_map(|category| category.image_handles().map(str::to_string).collect::<Vec<_>>())
                .collect();

            // Leaves first so every delete is explicit; the cascade covers the rest
            for id in subtree.iter().rev() {
                category_store::delete_category(&conn, id).await?;
            }
            category_store::mark_index_dirty(&conn).await?;

            Ok((subtree, handles))
        }
        .await;
        let (deleted, handles) = DatabaseService::finish_write(&conn, result).await?;

        if let Some(media_root) = &self.media_root {
            remove_image_files(media_root, &handles).await;
        }

        tracing::info!(
            category_id = %category_id,
            policy = ?policy,
            "Deleted category subtree ({} categories)",
            deleted.len()
        );
        self.emit_event(DomainEvent::CategoriesDeleted {
            root_id: category_id.to_string(),
            ids: deleted.clone(),
        });

        Ok(deleted)
    }

    pub async fn get_category(&self, category_id: &str) -> Result<Option<Category>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(category_store::get_category(&conn, category_id).await?)
    }

    /// Every category, active or not, ordered by (display_order, name)
    pub async fn list_all(&self) -> Result<Vec<Category>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(category_store::list_categories(&conn).await?)
    }

    pub async fn count(&self) -> Result<u64, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(category_store::count_categories(&conn).await?)
    }

    /// Update name, description, display order or active flag
    ///
    /// Renaming or reordering changes sibling order, so those edits dirty the
    /// tree index as well.
    pub async fn update_details(
        &self,
        category_id: &str,
        update: CategoryUpdate,
    ) -> Result<Category, CatalogServiceError> {
        let new_name = update
            .name
            .as_deref()
            .map(|name| validate_name("categoryName", name, self.max_name_length))
            .transpose()?;

        let conn = self.db.begin_write().await?;
        let result: Result<(Category, bool), CatalogServiceError> = async {
            let current = fetch_category(&conn, category_id).await?;
            if update.is_empty() {
                return Ok((current, false));
            }

            let name = new_name.unwrap_or_else(|| current.name.clone());
            if name != current.name {
                ensure_name_available(&conn, &name, Some(category_id)).await?;
            }
            let display_order = update.display_order.unwrap_or(current.display_order);
            let description = update
                .description
                .clone()
                .unwrap_or_else(|| current.description.clone());
            let is_active = update.is_active.unwrap_or(current.is_active);

            category_store::update_details(
                &conn,
                category_id,
                &name,
                &description,
                display_order,
                is_active,
            )
            .await?;

            if name != current.name || display_order != current.display_order {
                category_store::mark_index_dirty(&conn).await?;
            }

            Ok((fetch_category(&conn, category_id).await?, true))
        }
        .await;
        let (category, changed) = DatabaseService::finish_write(&conn, result).await?;

        if changed {
            tracing::debug!(category_id = %category_id, "Updated category details");
            self.emit_event(DomainEvent::CategoryUpdated(category.clone()));
        }

        Ok(category)
    }
}

/// Best-effort removal of image files referenced by deleted categories
async fn remove_image_files(media_root: &Path, handles: &[String]) {
    for handle in handles {
        let path = media_root.join(handle);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Deleted image file: {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to delete image file {}: {}", path.display(), e),
        }
    }
}

/// Load a category or fail with `NotFound`
pub(crate) async fn fetch_category(
    conn: &Connection,
    category_id: &str,
) -> Result<Category, CatalogServiceError> {
    category_store::get_category(conn, category_id)
        .await?
        .ok_or_else(|| CatalogServiceError::category_not_found(category_id))
}

async fn ensure_name_available(
    conn: &Connection,
    name: &str,
    except_id: Option<&str>,
) -> Result<(), CatalogServiceError> {
    match category_store::get_category_by_name(conn, name).await? {
        Some(existing) if Some(existing.id.as_str()) != except_id => {
            Err(ValidationError::DuplicateName(name.to_string()).into())
        }
        _ => Ok(()),
    }
}

/// A category that holds products must not gain children
async fn ensure_can_gain_child(conn: &Connection, parent_id: &str) -> Result<(), CatalogServiceError> {
    let products = category_store::count_products(conn, parent_id).await?;
    if products > 0 {
        return Err(CatalogServiceError::integrity(format!(
            "category {} holds {} product(s) and cannot have children",
            parent_id, products
        )));
    }
    Ok(())
}

/// Leaf rule check on the given connection (inside or outside a transaction)
pub(crate) async fn check_leaf_rule(
    conn: &Connection,
    category_id: &str,
) -> Result<(), CatalogServiceError> {
    let products = category_store::count_products(conn, category_id).await?;
    if products == 0 {
        return Ok(());
    }
    let children = category_store::count_children(conn, category_id).await?;
    if children > 0 {
        return Err(CatalogServiceError::integrity(format!(
            "category {} has {} product(s) and {} child category(ies)",
            category_id, products, children
        )));
    }
    Ok(())
}
