//! Category Tree Maintenance Binary
//!
//! Offline administrator tool for the storefront category tree: snapshot,
//! rebuild the nested-set index, verify counts, roll back from a snapshot,
//! audit the leaf rule and sweep orphaned category images.
//!
//! # Usage
//!
//! ```bash
//! # Backup to the default timestamped path, rebuild, then verify the count
//! category-tree --backup --rebuild --verify
//!
//! # Restore a snapshot without prompting
//! category-tree --rollback backups/categories_backup_20250101120000.json --no-input
//!
//! # Report (and clear) products sitting on parent categories
//! category-tree --check-integrity --fix
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DB_PATH`, `STOREFRONT_BACKUP_DIR`, `STOREFRONT_MEDIA_ROOT`,
//!   `STOREFRONT_MAX_NAME_LEN`: see `StorefrontConfig`
//! - `RUST_LOG`: Logging level (default: info)

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use storefront_core::db::DatabaseService;
use storefront_core::services::maintenance::is_affirmative;
use storefront_core::services::{
    AssumeYes, ConfirmationGate, MaintenancePlan, MaintenanceReport, TreeMaintenance,
};
use storefront_core::StorefrontConfig;

#[derive(Debug, Parser)]
#[command(
    name = "category-tree",
    version,
    about = "Backup, rebuild, verify or roll back the storefront category tree"
)]
struct Cli {
    /// Write a JSON snapshot first (default path: <backup dir>/categories_backup_<timestamp>.json)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    backup: Option<Option<PathBuf>>,

    /// Recompute the tree index
    #[arg(long)]
    rebuild: bool,

    /// Compare the category count before and after the rebuild
    #[arg(long)]
    verify: bool,

    /// Replace all categories with a snapshot (runs alone)
    #[arg(long, value_name = "PATH", conflicts_with_all = ["backup", "rebuild", "verify"])]
    rollback: Option<PathBuf>,

    /// Do not ask for confirmation
    #[arg(long)]
    no_input: bool,

    /// Report categories that hold products and children at once
    #[arg(long)]
    check_integrity: bool,

    /// With --check-integrity, clear product assignments from offending categories
    #[arg(long, requires = "check_integrity")]
    fix: bool,

    /// Delete category image files no category references
    #[arg(long)]
    cleanup_images: bool,
}

impl Cli {
    fn plan(&self, config: &StorefrontConfig) -> MaintenancePlan {
        MaintenancePlan {
            backup: self.backup.as_ref().map(|path| {
                path.clone()
                    .unwrap_or_else(|| config.default_backup_path(chrono::Utc::now()))
            }),
            rebuild: self.rebuild,
            verify: self.verify,
            rollback: self.rollback.clone(),
        }
    }
}

/// Asks on stdout and reads the answer from stdin
struct StdinGate;

impl ConfirmationGate for StdinGate {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{} [y/N]: ", prompt);
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(e) => {
                tracing::warn!("Failed to read confirmation: {}", e);
                false
            }
        }
    }
}

/// Human-readable summary of a maintenance run
fn report_lines(report: &MaintenanceReport, verify: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(backup) = &report.backup {
        lines.push(format!(
            "Backup written to {} ({} categories)",
            backup.path.display(),
            backup.item_count
        ));
    }
    if let Some(rows) = report.rows_rebuilt {
        lines.push(format!("Tree index rebuilt: {} rows", rows));
    }
    match (report.count_before, report.count_after) {
        (Some(before), Some(after)) => {
            lines.push(format!("Verification passed: {} before, {} after", before, after))
        }
        (Some(count), None) if verify => lines.push(format!("Category count: {}", count)),
        _ => {}
    }
    if let Some(rollback) = &report.rollback {
        lines.push(format!(
            "Rollback complete: {} categories restored, {} parent links applied",
            rollback.restored, rollback.linked
        ));
        for id in &rollback.orphaned {
            lines.push(format!("  restored as root (parent missing from snapshot): {}", id));
        }
        lines.push("Run --rebuild to refresh the tree index".to_string());
    }
    if report.aborted {
        lines.push("Aborted.".to_string());
    }
    lines
}

fn print_report(report: &MaintenanceReport, verify: bool) {
    for line in report_lines(report, verify) {
        println!("{}", line);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = StorefrontConfig::from_env().context("Invalid configuration")?;
    let plan = cli.plan(&config);

    if plan.is_empty() && !cli.check_integrity && !cli.cleanup_images {
        println!("Nothing to do. Pass --backup, --rebuild, --verify, --rollback, --check-integrity or --cleanup-images (see --help).");
        return Ok(());
    }

    tracing::info!("Database: {}", config.db_path.display());
    let db = Arc::new(
        DatabaseService::new(config.db_path.clone())
            .await
            .with_context(|| format!("Failed to open {}", config.db_path.display()))?,
    );
    let maintenance = TreeMaintenance::new(db.clone());

    let gate: Box<dyn ConfirmationGate> = if cli.no_input {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinGate)
    };

    if !plan.is_empty() {
        let report = maintenance.run(&plan, gate.as_ref()).await?;
        print_report(&report, plan.verify);
        if report.aborted {
            return Ok(());
        }
    }

    if cli.check_integrity {
        let report = maintenance.check_integrity(cli.fix).await?;
        if report.is_clean() {
            println!("Integrity check passed");
        }
        for violation in &report.leaf_rule_violations {
            println!(
                "Category '{}' ({}) has {} product(s) and {} child category(ies)",
                violation.category_name,
                violation.category_id,
                violation.product_count,
                violation.child_count
            );
        }
        if !report.cycle_members.is_empty() {
            println!("Parent cycle through: {}", report.cycle_members.join(", "));
        }
        if cli.fix {
            println!("Cleared {} product assignment(s)", report.assignments_cleared);
        }
    }

    if cli.cleanup_images {
        let report = maintenance.cleanup_orphan_images(&config.media_root).await?;
        println!(
            "Removed {} orphan file(s) and {} empty dir(s); kept {}",
            report.removed_files.len(),
            report.removed_dirs.len(),
            report.kept_files
        );
        for path in &report.failed {
            println!("  could not remove {}", path.display());
        }
    }

    db.checkpoint().await.context("Failed to checkpoint the database")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_without_rebuild_prints_count() {
        let report = MaintenanceReport {
            count_before: Some(12),
            ..Default::default()
        };
        assert_eq!(report_lines(&report, true), ["Category count: 12"]);
        assert!(report_lines(&report, false).is_empty());
    }

    #[test]
    fn test_verify_after_rebuild_prints_both_counts() {
        let report = MaintenanceReport {
            count_before: Some(12),
            rows_rebuilt: Some(12),
            count_after: Some(12),
            ..Default::default()
        };
        assert_eq!(
            report_lines(&report, true),
            ["Tree index rebuilt: 12 rows", "Verification passed: 12 before, 12 after"]
        );
    }

    #[test]
    fn test_verify_flag_parses_alone() {
        let cli = Cli::try_parse_from(["category-tree", "--verify"]).unwrap();
        assert!(cli.verify);
        assert!(!cli.rebuild);
    }
}
