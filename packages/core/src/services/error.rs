//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for business logic failures.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
///
/// Provides high-level error types for all catalog operations,
/// with detailed context and proper error chaining.
#[derive(Error, Debug)]
pub enum CatalogServiceError {
    /// Validation failed for the input
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Parent assignment would create a loop
    #[error("Cycle detected: {context}")]
    Cycle { context: String },

    /// A category would hold products and children at the same time
    #[error("Integrity violation: {context}")]
    Integrity { context: String },

    /// Assignment rejected because some categories have children
    #[error("Categories with children cannot hold products: {}", rejected_ids.join(", "))]
    LeafRuleRejected { rejected_ids: Vec<String> },

    /// Category count changed across a rebuild
    #[error("Consistency check failed: {before} categories before, {after} after")]
    Consistency { before: u64, after: u64 },

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem error (snapshot or media files)
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Transaction failed
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Rollback restored categories but could not re-link parents
    ///
    /// The store is left with every restored category parentless.
    #[error("Rollback restored {restored} categories but failed to re-link parents: {context}")]
    RollbackLinkFailed { restored: u64, context: String },

    /// A maintenance step failed; later steps were not run
    #[error("Maintenance step '{step}' failed: {source}")]
    StepFailed {
        step: &'static str,
        #[source]
        source: Box<CatalogServiceError>,
    },
}

impl CatalogServiceError {
    /// Create a category not found error
    pub fn category_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Category",
            id: id.into(),
        }
    }

    /// Create a product not found error
    pub fn product_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Product",
            id: id.into(),
        }
    }

    /// Create a cycle error
    pub fn cycle(context: impl Into<String>) -> Self {
        Self::Cycle {
            context: context.into(),
        }
    }

    /// Create an integrity error
    pub fn integrity(context: impl Into<String>) -> Self {
        Self::Integrity {
            context: context.into(),
        }
    }

    /// Create a transaction failed error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an I/O error bound to a path
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Wrap an error as the failure of a named maintenance step
    pub fn step_failed(step: &'static str, source: CatalogServiceError) -> Self {
        Self::StepFailed {
            step,
            source: Box::new(source),
        }
    }

    /// Ids listed by a leaf-rule rejection (empty for other errors)
    pub fn rejected_category_ids(&self) -> &[String] {
        match self {
            Self::LeafRuleRejected { rejected_ids } => rejected_ids,
            Self::StepFailed { source, .. } => source.rejected_category_ids(),
            _ => &[],
        }
    }

    /// Name of the failed maintenance step, if any
    pub fn failed_step(&self) -> Option<&'static str> {
        match self {
            Self::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CatalogServiceError::category_not_found("c-9");
        assert_eq!(err.to_string(), "Category not found: c-9");
    }

    #[test]
    fn test_step_failed_exposes_inner_rejection() {
        let inner = CatalogServiceError::LeafRuleRejected {
            rejected_ids: vec!["a".to_string(), "b".to_string()],
        };
        let err = CatalogServiceError::step_failed("assign", inner);

        assert_eq!(err.failed_step(), Some("assign"));
        assert_eq!(err.rejected_category_ids(), ["a".to_string(), "b".to_string()]);
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_validation_converts() {
        let err: CatalogServiceError = ValidationError::MissingField("categoryName".into()).into();
        assert!(matches!(err, CatalogServiceError::Validation(_)));
    }
}
