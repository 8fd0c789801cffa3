//! Product Service
//!
//! Minimal product rows so categories have something to hold. Category
//! assignment lives in `AssignmentGate`.

use crate::db::{product_store, DatabaseService};
use crate::models::{NewProduct, Product, MAX_NAME_LENGTH};
use crate::services::error::CatalogServiceError;
use chrono::Utc;
use std::sync::Arc;

pub struct ProductService {
    db: Arc<DatabaseService>,
    max_name_length: usize,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            db,
            max_name_length: MAX_NAME_LENGTH,
        }
    }

    pub fn with_max_name_length(mut self, max_name_length: usize) -> Self {
        self.max_name_length = max_name_length;
        self
    }

    /// Validate and insert a product with no categories
    ///
    /// # Errors
    ///
    /// `Validation` for a blank or too long name, or a negative price.
    pub async fn create_product(&self, input: NewProduct) -> Result<Product, CatalogServiceError> {
        let (name, price) = input.validate(self.max_name_length)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.db.connect_with_timeout().await?;
        product_store::insert_product(
            &conn,
            product_store::DbCreateProductParams {
                id: &id,
                name: &name,
                description: &input.description,
                price: &price,
                stock_quantity: input.stock_quantity,
                is_active: input.is_active,
                timestamp: &now,
            },
        )
        .await?;

        tracing::debug!(product_id = %id, "Created product '{}'", name);

        product_store::get_product(&conn, &id)
            .await?
            .ok_or_else(|| CatalogServiceError::product_not_found(&id))
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Option<Product>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(product_store::get_product(&conn, product_id).await?)
    }

    /// Category ids currently assigned to the product, sorted
    pub async fn category_ids(&self, product_id: &str) -> Result<Vec<String>, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        if product_store::get_product(&conn, product_id).await?.is_none() {
            return Err(CatalogServiceError::product_not_found(product_id));
        }
        Ok(product_store::product_category_ids(&conn, product_id).await?)
    }
}
