//! Tree Maintenance Toolchain
//!
//! Offline administrator operations over the whole category table:
//!
//! - **backup**: write a [`CategorySnapshot`] (pure read)
//! - **rebuild**: recompute the nested-set columns in one transaction
//! - **verify**: compare the category count with a count taken earlier
//! - **rollback**: replace every category with a snapshot's contents
//!
//! plus `check_integrity` and `cleanup_orphan_images`.
//!
//! # Failure Semantics
//!
//! Rebuild computes the full index before writing; an error at any point
//! rolls the transaction back and leaves the previous index in place.
//!
//! Rollback validates the snapshot before deleting anything, then runs two
//! transactions. Pass one deletes all categories and inserts every snapshot
//! item without a parent. Pass two re-links parents. If pass two fails the
//! store is left with every restored category parentless (never cyclic), and
//! the call returns `RollbackLinkFailed`. Restoring also drops every product
//! assignment, because deleting the old rows cascades to them.

mod confirmation;
mod image_cleanup;
mod integrity;
mod snapshot;

pub use confirmation::{is_affirmative, AssumeYes, ConfirmationGate};
pub use image_cleanup::ImageCleanupReport;
pub use integrity::{IntegrityReport, LeafRuleViolation};
pub use snapshot::{CategorySnapshot, SnapshotItem, SnapshotMetadata};

use crate::db::events::DomainEvent;
use crate::db::{category_store, DatabaseService};
use crate::services::error::CatalogServiceError;
use crate::services::tree_index::{build_tree_index, TreeNodeInput};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Result of an operation guarded by a confirmation gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceOutcome<T> {
    Completed(T),
    /// The gate declined; nothing was changed
    Aborted,
}

impl<T> MaintenanceOutcome<T> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, MaintenanceOutcome::Aborted)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            MaintenanceOutcome::Completed(value) => Some(value),
            MaintenanceOutcome::Aborted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub path: PathBuf,
    pub item_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackSummary {
    pub restored: u64,
    pub linked: u64,
    /// Items whose parent was missing from the snapshot, restored as roots
    pub orphaned: Vec<String>,
}

/// Which steps `run` performs
///
/// A plan with `rollback` set runs only the rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenancePlan {
    pub backup: Option<PathBuf>,
    pub rebuild: bool,
    pub verify: bool,
    pub rollback: Option<PathBuf>,
}

impl MaintenancePlan {
    pub fn is_empty(&self) -> bool {
        self.backup.is_none() && !self.rebuild && !self.verify && self.rollback.is_none()
    }
}

/// What `run` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub backup: Option<BackupSummary>,
    pub count_before: Option<u64>,
    pub rows_rebuilt: Option<u64>,
    pub count_after: Option<u64>,
    pub rollback: Option<RollbackSummary>,
    pub aborted: bool,
}

pub struct TreeMaintenance {
    db: Arc<DatabaseService>,
    event_tx: Option<broadcast::Sender<DomainEvent>>,
}

impl TreeMaintenance {
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

    pub async fn count(&self) -> Result<u64, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(category_store::count_categories(&conn).await?)
    }

    /// Snapshot every category to `path`
    pub async fn backup(&self, path: &Path) -> Result<BackupSummary, CatalogServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let categories = category_store::list_categories(&conn).await?;
        let snapshot = CategorySnapshot::from_categories(&categories, Utc::now());
        snapshot.write_to(path).await?;

        tracing::info!(
            "Backup written: {} ({} items)",
            path.display(),
            snapshot.metadata.item_count
        );

        Ok(BackupSummary {
            path: path.to_path_buf(),
            item_count: snapshot.metadata.item_count,
        })
    }

    /// Recompute the tree index after confirmation
    pub async fn rebuild(
        &self,
        gate: &dyn ConfirmationGate,
    ) -> Result<MaintenanceOutcome<u64>, CatalogServiceError> {
        if !gate.confirm("Rebuild the category tree index?") {
            tracing::info!("Rebuild aborted by user");
            return Ok(MaintenanceOutcome::Aborted);
        }
        self.rebuild_index().await.map(MaintenanceOutcome::Completed)
    }

    /// Recompute and write every row's tree fields in one transaction
    ///
    /// Returns the number of rows written (0 for an empty table). Clears the
    /// dirty flag in the same transaction.
    pub async fn rebuild_index(&self) -> Result<u64, CatalogServiceError> {
        let conn = self.db.begin_write().await?;
        let result: Result<u64, CatalogServiceError> = async {
            let links = category_store::list_links(&conn).await?;
            let inputs: Vec<TreeNodeInput> = links.iter().map(TreeNodeInput::from).collect();
            let index = build_tree_index(&inputs)
                .map_err(|e| CatalogServiceError::integrity(format!("cannot rebuild tree index: {}", e)))?;

            let mut written = 0u64;
            for (id, fields) in &index.entries {
                written += category_store::write_tree_fields(&conn, id, fields).await?;
            }
            category_store::mark_index_clean(&conn, written).await?;

            tracing::debug!(
                "Computed tree index for {} categories in {} trees",
                index.len(),
                index.tree_count()
            );
            Ok(written)
        }
        .await;
        let written = DatabaseService::finish_write(&conn, result).await?;

        tracing::info!("Tree index rebuilt ({} rows)", written);
        self.emit_event(DomainEvent::TreeIndexRebuilt {
            rows_written: written,
        });
        Ok(written)
    }

    /// Fail with `Consistency` if the category count differs from `before`
    pub async fn verify(&self, before: u64) -> Result<u64, CatalogServiceError> {
        let after = self.count().await?;
        if before != after {
            return Err(CatalogServiceError::Consistency { before, after });
        }
        tracing::info!("Verification passed: {} categories", after);
        Ok(after)
    }

    /// Replace all categories with the snapshot at `path` after confirmation
    pub async fn rollback(
        &self,
        path: &Path,
        gate: &dyn ConfirmationGate,
    ) -> Result<MaintenanceOutcome<RollbackSummary>, CatalogServiceError> {
        let snapshot = CategorySnapshot::read_from(path).await?;
        snapshot.validate()?;

        let prompt = format!(
            "Rollback will DELETE all current categories and restore {} from {}. Continue?",
            snapshot.items.len(),
            path.display()
        );
        if !gate.confirm(&prompt) {
            tracing::info!("Rollback aborted by user");
            return Ok(MaintenanceOutcome::Aborted);
        }

        self.restore(&snapshot).await.map(MaintenanceOutcome::Completed)
    }

    /// Two-pass restore of a validated snapshot
    pub async fn restore(&self, snapshot: &CategorySnapshot) -> Result<RollbackSummary, CatalogServiceError> {
        let restored = self.restore_parentless(snapshot).await?;
        tracing::info!("Restored {} categories without parents", restored);

        let orphaned: Vec<String> = snapshot
            .dangling_parents()
            .into_iter()
            .map(|item| item.id.clone())
            .collect();
        for id in &orphaned {
            tracing::warn!(category_id = %id, "Parent missing from snapshot, restored as root");
        }

        let linked = self
            .restore_links(snapshot, &orphaned)
            .await
            .map_err(|e| CatalogServiceError::RollbackLinkFailed {
                restored,
                context: e.to_string(),
            })?;

        tracing::info!("Rollback complete: {} restored, {} linked", restored, linked);
        self.emit_event(DomainEvent::CategoriesRestored { restored });

        Ok(RollbackSummary {
            restored,
            linked,
            orphaned,
        })
    }

    async fn restore_parentless(&self, snapshot: &CategorySnapshot) -> Result<u64, CatalogServiceError> {
        let now = Utc::now();
        let conn = self.db.begin_write().await?;
        let result: Result<u64, CatalogServiceError> = async {
            let deleted = category_store::delete_all_categories(&conn).await?;
            tracing::debug!("Deleted {} existing categories", deleted);

            for item in &snapshot.items {
                category_store::insert_category(
                    &conn,
                    category_store::DbCreateCategoryParams {
                        id: &item.id,
                        name: &item.category_name,
                        parent_id: None,
                        display_order: item.display_order,
                        description: &item.description,
                        is_active: item.is_active,
                        image: None,
                        timestamp: &now,
                    },
                )
                .await?;
            }
            category_store::mark_index_dirty(&conn).await?;
            Ok(snapshot.items.len() as u64)
        }
        .await;
        DatabaseService::finish_write(&conn, result).await
    }

    async fn restore_links(
        &self,
        snapshot: &CategorySnapshot,
        orphaned: &[String],
    ) -> Result<u64, CatalogServiceError> {
        let conn = self.db.begin_write().await?;
        let result: Result<u64, CatalogServiceError> = async {
            let mut linked = 0;
            for item in &snapshot.items {
                let Some(parent_id) = item.parent_id.as_deref() else {
                    continue;
                };
                if orphaned.contains(&item.id) {
                    continue;
                }
                linked += category_store::update_parent(&conn, &item.id, Some(parent_id)).await?;
            }
            category_store::mark_index_dirty(&conn).await?;
            Ok(linked)
        }
        .await;
        DatabaseService::finish_write(&conn, result).await
    }

    /// Audit leaf-rule violations and parent cycles
    pub async fn check_integrity(&self, fix: bool) -> Result<IntegrityReport, CatalogServiceError> {
        integrity::check_integrity(&self.db, fix).await
    }

    /// Delete unreferenced files under `<media_root>/categories`
    pub async fn cleanup_orphan_images(
        &self,
        media_root: &Path,
    ) -> Result<ImageCleanupReport, CatalogServiceError> {
        image_cleanup::cleanup_orphan_images(&self.db, media_root).await
    }

    /// Run backup, rebuild and verify (or a rollback) as one workflow
    ///
    /// Stops at the first failing step and reports it as `StepFailed`.
    /// `verify` without `rebuild` only records the current count.
    pub async fn run(
        &self,
        plan: &MaintenancePlan,
        gate: &dyn ConfirmationGate,
    ) -> Result<MaintenanceReport, CatalogServiceError> {
        let mut report = MaintenanceReport::default();

        if let Some(path) = &plan.rollback {
            match self
                .rollback(path, gate)
                .await
                .map_err(|e| CatalogServiceError::step_failed("rollback", e))?
            {
                MaintenanceOutcome::Completed(summary) => report.rollback = Some(summary),
                MaintenanceOutcome::Aborted => report.aborted = true,
            }
            return Ok(report);
        }

        if let Some(path) = &plan.backup {
            report.backup = Some(
                self.backup(path)
                    .await
                    .map_err(|e| CatalogServiceError::step_failed("backup", e))?,
            );
        }

        let before = self
            .count()
            .await
            .map_err(|e| CatalogServiceError::step_failed("count", e))?;
        report.count_before = Some(before);

        if plan.rebuild {
            match self
                .rebuild(gate)
                .await
                .map_err(|e| CatalogServiceError::step_failed("rebuild", e))?
            {
                MaintenanceOutcome::Completed(rows) => report.rows_rebuilt = Some(rows),
                MaintenanceOutcome::Aborted => {
                    report.aborted = true;
                    return Ok(report);
                }
            }

            if plan.verify {
                report.count_after = Some(
                    self.verify(before)
                        .await
                        .map_err(|e| CatalogServiceError::step_failed("verify", e))?,
                );
            }
        }

        Ok(report)
    }
}
