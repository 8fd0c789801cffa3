//! Product-Category Assignment Gate
//!
//! Replaces a product's full category set, but only when every requested
//! category is a leaf. The children check and the replace run in the same
//! `BEGIN IMMEDIATE` transaction, so a concurrent `set_parent` cannot give a
//! requested category a child between the check and the write.

use crate::db::events::DomainEvent;
use crate::db::{product_store, DatabaseService};
use crate::services::category_service::check_leaf_rule;
use crate::services::error::CatalogServiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Successful assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentOutcome {
    pub assigned_ids: Vec<String>,
}

/// Structured rejection for callers that render errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRejection {
    pub bad_category_ids: Vec<String>,
    pub reason: String,
}

impl AssignmentRejection {
    /// Extract the rejection from a leaf-rule error
    pub fn from_error(error: &CatalogServiceError) -> Option<Self> {
        let ids = error.rejected_category_ids();
        if ids.is_empty() {
            return None;
        }
        Some(Self {
            bad_category_ids: ids.to_vec(),
            reason: "categories with children cannot hold products".to_string(),
        })
    }
}

pub struct AssignmentGate {
    db: Arc<DatabaseService>,
    event_tx: Option<broadcast::Sender<DomainEvent>>,
}

impl AssignmentGate {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db, event_tx: None }
    }

    pub fn with_events(mut self, event_tx: broadcast::Sender<DomainEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    fn emit_event(&self, event: DomainEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Replace the product's categories with `category_ids`
    ///
    /// Duplicates are dropped, first occurrence wins. An empty list clears
    /// the product's categories.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown product, or for the first unknown category
    /// - `LeafRuleRejected` listing every requested id that has children, in
    ///   request order; nothing is written
    pub async fn assign_categories(
        &self,
        product_id: &str,
        category_ids: &[String],
    ) -> Result<AssignmentOutcome, CatalogServiceError> {
        let requested = dedupe_preserving_order(category_ids);

        let conn = self.db.begin_write().await?;
        let result: Result<Vec<String>, CatalogServiceError> = async {
            if product_store::get_product(&conn, product_id).await?.is_none() {
                return Err(CatalogServiceError::product_not_found(product_id));
            }

            let existing: HashSet<String> = product_store::existing_category_ids(&conn, &requested)
                .await?
                .into_iter()
                .collect();
            if let Some(missing) = requested.iter().find(|id| !existing.contains(*id)) {
                return Err(CatalogServiceError::category_not_found(missing.as_str()));
            }

            let with_children: HashSet<String> =
                product_store::category_ids_with_children(&conn, &requested)
                    .await?
                    .into_iter()
                    .collect();
            let rejected: Vec<String> = requested
                .iter()
                .filter(|id| with_children.contains(*id))
                .cloned()
                .collect();
            if !rejected.is_empty() {
                return Err(CatalogServiceError::LeafRuleRejected {
                    rejected_ids: rejected,
                });
            }

            product_store::replace_assignments(&conn, product_id, &requested).await?;
            for id in &requested {
                check_leaf_rule(&conn, id).await?;
            }

            Ok(requested)
        }
        .await;

        let assigned_ids = match DatabaseService::finish_write(&conn, result).await {
            Ok(ids) => ids,
            Err(e) => {
                if let CatalogServiceError::LeafRuleRejected { rejected_ids } = &e {
                    tracing::info!(
                        product_id = %product_id,
                        "Rejected category assignment, categories have children: {:?}",
                        rejected_ids
                    );
                }
                return Err(e);
            }
        };

        tracing::debug!(
            product_id = %product_id,
            "Assigned {} categories",
            assigned_ids.len()
        );
        self.emit_event(DomainEvent::ProductCategoriesAssigned {
            product_id: product_id.to_string(),
            category_ids: assigned_ids.clone(),
        });

        Ok(AssignmentOutcome { assigned_ids })
    }
}

fn dedupe_preserving_order(ids: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(id.as_str()) {
            unique.push(id.clone());
        }
    }
    unique
}
