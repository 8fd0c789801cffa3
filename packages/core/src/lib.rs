//! Storefront Catalog Core
//!
//! Category tree subsystem of the storefront backend: hierarchical product
//! categories with a leaf-only product assignment rule, descendant-inclusive
//! product queries, and an offline backup/rebuild/verify/rollback toolchain.
//!
//! # Architecture
//!
//! - **libsql**: Embedded SQLite-compatible database, explicit transactions
//! - **Parent pointers are the source of truth**: nested-set columns are a
//!   bulk-rebuilt index guarded by a persisted dirty flag
//! - **Typed errors**: `thiserror` enums per layer
//!
//! # Modules
//!
//! - [`models`] - Data structures (Category, Product, DTOs)
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - Business services (CategoryService, TreeMaintenance, etc.)
//! - [`config`] - Paths and limits with environment overrides

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{ConfigError, StorefrontConfig};
pub use models::*;
pub use services::*;
