//! Database Layer
//!
//! All persistence goes through libsql (embedded SQLite):
//!
//! - [`DatabaseService`]: connection management, schema, write transactions
//! - [`category_store`]: category rows and the tree index state
//! - [`product_store`]: products and category assignments
//! - [`events`]: domain events emitted by the services after commit

pub mod category_store;
mod database;
mod error;
pub mod events;
pub mod product_store;

pub use category_store::{CategoryLink, CategoryUsage, TreeIndexState};
pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::{CategoryMove, DomainEvent};
