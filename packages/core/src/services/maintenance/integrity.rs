//! Leaf-rule and parent-cycle audit
//!
//! The store enforces both invariants on write, but rows written before the
//! checks existed (or edited by hand) can still violate them.

use crate::db::{category_store, CategoryUsage, DatabaseService};
use crate::services::error::CatalogServiceError;
use crate::services::hierarchy::find_cycle_members;
use serde::{Deserialize, Serialize};

/// A category holding products and children at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafRuleViolation {
    pub category_id: String,
    pub category_name: String,
    pub product_count: u64,
    pub child_count: u64,
}

impl From<CategoryUsage> for LeafRuleViolation {
    fn from(usage: CategoryUsage) -> Self {
        Self {
            category_id: usage.id,
            category_name: usage.name,
            product_count: usage.product_count,
            child_count: usage.child_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub leaf_rule_violations: Vec<LeafRuleViolation>,
    /// Ids on a corrupt parent cycle (reported, never auto-fixed)
    pub cycle_members: Vec<String>,
    /// Product assignments removed by `fix`
    pub assignments_cleared: u64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.leaf_rule_violations.is_empty() && self.cycle_members.is_empty()
    }
}

/// Scan every category; with `fix`, clear product assignments from the
/// offending parents in one transaction
pub(super) async fn check_integrity(
    db: &DatabaseService,
    fix: bool,
) -> Result<IntegrityReport, CatalogServiceError> {
    let conn = db.connect_with_timeout().await?;

    let leaf_rule_violations: Vec<LeafRuleViolation> = category_store::list_usage(&conn)
        .await?
        .into_iter()
        .filter(|usage| usage.product_count > 0 && usage.child_count > 0)
        .map(LeafRuleViolation::from)
        .collect();
    let cycle_members = find_cycle_members(&category_store::parent_map(&conn).await?);

    for violation in &leaf_rule_violations {
        tracing::warn!(
            category_id = %violation.category_id,
            "Category '{}' has {} product(s) and {} child category(ies)",
            violation.category_name,
            violation.product_count,
            violation.child_count
        );
    }
    if !cycle_members.is_empty() {
        tracing::warn!("Parent cycle detected through: {}", cycle_members.join(", "));
    }

    let mut report = IntegrityReport {
        leaf_rule_violations,
        cycle_members,
        assignments_cleared: 0,
    };

    if fix && !report.leaf_rule_violations.is_empty() {
        let conn = db.begin_write().await?;
        let result: Result<u64, CatalogServiceError> = async {
            let mut cleared = 0;
            for violation in &report.leaf_rule_violations {
                cleared +=
                    category_store::clear_product_assignments(&conn, &violation.category_id)
                        .await?;
            }
            Ok(cleared)
        }
        .await;
        report.assignments_cleared = DatabaseService::finish_write(&conn, result).await?;

        tracing::info!(
            "Cleared {} product assignment(s) from {} categories",
            report.assignments_cleared,
            report.leaf_rule_violations.len()
        );
    }

    Ok(report)
}
