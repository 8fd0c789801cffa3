//! Category Query Service
//!
//! Read-side operations: active category listing and products under a
//! category, optionally including every descendant.
//!
//! Descendant-inclusive queries can run two ways:
//!
//! - **Index**: one interval query over the nested-set columns. Only correct
//!   while the tree index is fresh.
//! - **Recursive**: loads parent links and walks the subtree with a visited
//!   set. Always correct, O(subtree).
//!
//! `TraversalStrategy::Auto` picks the index when the persisted dirty flag is
//! clear and the category has tree fields, and recursion otherwise. Both
//! paths return identical results on a fresh index.

use crate::db::{category_store, product_store, DatabaseService};
use crate::models::{Category, CategorySummary, Product, ProductSummary};
use crate::services::category_service::fetch_category;
use crate::services::error::CatalogServiceError;
use crate::services::hierarchy::{self, children_map, collect_descendants};
use libsql::Connection;
use std::sync::Arc;

/// How descendant-inclusive queries find the subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalStrategy {
    /// Index when fresh, recursion when stale
    #[default]
    Auto,
    /// Nested-set interval query (trusts the index even if stale)
    Index,
    /// Parent/child walk
    Recursive,
}

/// Read-only category queries
pub struct CategoryQueryService {
    db: Arc<DatabaseService>,
}

impl CategoryQueryService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Active categories ordered by (display_order, name)
    pub async fn list_active(&self) -> Result<Vec<CategorySummary>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let categories = category_store::list_active_categories(&conn).await?;
        Ok(categories.iter().map(CategorySummary::from).collect())
    }

    /// Products assigned to `category_id`, or to it and any descendant
    ///
    /// Results are distinct and ordered by product name.
    ///
    /// # Errors
    ///
    /// `NotFound` if the category does not exist.
    pub async fn products_under(
        &self,
        category_id: &str,
        include_descendants: bool,
        strategy: TraversalStrategy,
    ) -> Result<Vec<ProductSummary>, CatalogServiceError> {
        let conn = self.db.begin_read().await?;
        let result = self
            .products_under_in(&conn, category_id, include_descendants, strategy)
            .await;
        let products = DatabaseService::finish_write(&conn, result).await?;
        Ok(products.iter().map(ProductSummary::from).collect())
    }

    async fn products_under_in(
        &self,
        conn: &Connection,
        category_id: &str,
        include_descendants: bool,
        strategy: TraversalStrategy,
    ) -> Result<Vec<Product>, CatalogServiceError> {
        let category = fetch_category(conn, category_id).await?;

        if !include_descendants {
            return Ok(product_store::products_in_categories(conn, &[category.id]).await?);
        }

        let use_index = match strategy {
            TraversalStrategy::Index => true,
            TraversalStrategy::Recursive => false,
            TraversalStrategy::Auto => {
                !category.tree.is_unbuilt() && !category_store::get_index_state(conn).await?.dirty
            }
        };

        tracing::debug!(
            category_id = %category_id,
            strategy = ?strategy,
            use_index,
            "Listing products under category"
        );

        if use_index {
            Ok(product_store::products_in_interval(conn, &category.tree).await?)
        } else {
            let ids = subtree_ids(conn, category_id).await?;
            Ok(product_store::products_in_categories(conn, &ids).await?)
        }
    }

    /// `category_id` followed by every descendant id, pre-order
    ///
    /// Always computed from parent links; terminates on corrupt cycles.
    pub async fn descendant_ids(&self, category_id: &str) -> Result<Vec<String>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        fetch_category(&conn, category_id).await?;
        subtree_ids(&conn, category_id).await
    }

    /// Ancestors of `category_id`, nearest parent first
    pub async fn ancestors(&self, category_id: &str) -> Result<Vec<Category>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        fetch_category(&conn, category_id).await?;

        let parents = category_store::parent_map(&conn).await?;
        let mut chain = Vec::new();
        for id in hierarchy::ancestors(&parents, category_id) {
            chain.push(fetch_category(&conn, &id).await?);
        }
        Ok(chain)
    }

    /// Ancestors read from the nested-set columns, root first
    ///
    /// Only meaningful while the index is fresh.
    pub async fn indexed_ancestors(&self, category_id: &str) -> Result<Vec<Category>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let category = fetch_category(&conn, category_id).await?;
        Ok(category_store::list_index_ancestors(&conn, &category.tree).await?)
    }

    /// Descendants read from the nested-set columns, pre-order, self excluded
    ///
    /// Only meaningful while the index is fresh.
    pub async fn indexed_descendants(&self, category_id: &str) -> Result<Vec<Category>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let category = fetch_category(&conn, category_id).await?;
        Ok(category_store::list_index_descendants(&conn, &category.tree).await?)
    }

    /// True when the nested-set columns reflect the current parent links
    pub async fn is_index_fresh(&self) -> Result<bool, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(!category_store::get_index_state(&conn).await?.dirty)
    }
}

async fn subtree_ids(conn: &Connection, category_id: &str) -> Result<Vec<String>, CatalogServiceError> {
    let parents = category_store::parent_map(conn).await?;
    Ok(collect_descendants(&children_map(&parents), category_id))
}
