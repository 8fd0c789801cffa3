//! Business Services
//!
//! This module contains the catalog business logic:
//!
//! - `CategoryService` - Category store with cycle and leaf-rule enforcement
//! - `CategoryQueryService` - Active listing and descendant-inclusive product queries
//! - `AssignmentGate` - Leaf-only product-category assignment
//! - `ProductService` - Product rows
//! - `TreeMaintenance` - Backup, rebuild, verify, rollback and audits
//!
//! Services coordinate between the database layer and application logic,
//! implementing business rules and transaction boundaries. The pure tree
//! algorithms live in `hierarchy` and `tree_index`.

pub mod assignment_gate;
pub mod category_query;
pub mod category_service;
pub mod error;
pub mod hierarchy;
pub mod image_pipeline;
pub mod maintenance;
pub mod product_service;
pub mod tree_index;


pub use assignment_gate::{AssignmentGate, AssignmentOutcome, AssignmentRejection};
pub use category_query::{CategoryQueryService, TraversalStrategy};
pub use category_service::{CategoryService, DeletePolicy};
pub use error::CatalogServiceError;
pub use image_pipeline::{ConventionalThumbnailHandles, ImagePipeline, ImagePipelineError};
pub use maintenance::{
    AssumeYes, BackupSummary, CategorySnapshot, ConfirmationGate, ImageCleanupReport,
    IntegrityReport, LeafRuleViolation, MaintenanceOutcome, MaintenancePlan, MaintenanceReport,
    RollbackSummary, TreeMaintenance,
};
pub use product_service::ProductService;
pub use tree_index::{build_tree_index, TreeIndex, TreeIndexError, TreeNodeInput};
