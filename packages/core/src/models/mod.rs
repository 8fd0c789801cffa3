//! Data Models
//!
//! This module contains the core data structures of the catalog:
//!
//! - `Category` - Hierarchical product category with nested-set tree fields
//! - `Product` - Catalog product assigned to leaf categories
//! - Image handles produced by the external image pipeline
//!
//! Wire-facing types serialize in camelCase.

mod category;
mod image;
mod product;

pub use category::{
    validate_name, Category, CategorySummary, CategoryUpdate, NewCategory, TreeFields,
    ValidationError, MAX_NAME_LENGTH,
};
pub use image::{
    category_thumbnail_handle, ThumbnailSet, CATEGORY_MEDIA_DIR, THUMBNAIL_PREVIEW_SIZE,
    THUMBNAIL_SQUARE_SIZE,
};
pub use product::{normalize_price, NewProduct, Product, ProductSummary, PRICE_SCALE};
