//! Orphan category image cleanup
//!
//! Deletes files under `<media_root>/categories` that no category references
//! through `image`, `thumbnail_150` or `thumbnail_800`, then removes empty
//! directories. The `categories` directory itself is kept.

use crate::db::{category_store, DatabaseService};
use crate::models::CATEGORY_MEDIA_DIR;
use crate::services::error::CatalogServiceError;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCleanupReport {
    pub removed_files: Vec<PathBuf>,
    pub removed_dirs: Vec<PathBuf>,
    pub kept_files: usize,
    /// Paths that could not be removed; the sweep continues past them
    pub failed: Vec<PathBuf>,
}

/// Lexically normalize a media-root-relative handle
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

pub(super) async fn cleanup_orphan_images(
    db: &DatabaseService,
    media_root: &Path,
) -> Result<ImageCleanupReport, CatalogServiceError> {
    let conn = db.connect_with_timeout().await?;
    let referenced: HashSet<PathBuf> = category_store::list_categories(&conn)
        .await?
        .iter()
        .flat_map(|category| {
            category
                .image_handles()
                .map(|handle| normalize(Path::new(handle)))
                .collect::<Vec<_>>()
        })
        .collect();

    let media_root = media_root.to_path_buf();
    let report = tokio::task::spawn_blocking(move || sweep(&media_root, &referenced))
        .await
        .map_err(|e| CatalogServiceError::transaction_failed(format!("image cleanup task failed: {}", e)))??;

    tracing::info!(
        "Image cleanup removed {} file(s) and {} dir(s), kept {}",
        report.removed_files.len(),
        report.removed_dirs.len(),
        report.kept_files
    );
    Ok(report)
}

fn sweep(media_root: &Path, referenced: &HashSet<PathBuf>) -> Result<ImageCleanupReport, CatalogServiceError> {
    let base = media_root.join(CATEGORY_MEDIA_DIR);
    let mut report = ImageCleanupReport::default();

    if !base.is_dir() {
        tracing::info!("No {} directory, nothing to clean", base.display());
        return Ok(report);
    }

    let mut dirs = Vec::new();
    for entry in walkdir::WalkDir::new(&base).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(%err, "Skipping unreadable path during image cleanup");
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            if path != base {
                dirs.push(path.to_path_buf());
            }
            continue;
        }

        let relative = match path.strip_prefix(media_root) {
            Ok(relative) => normalize(relative),
            Err(_) => continue,
        };
        if referenced.contains(&relative) {
            report.kept_files += 1;
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Deleted orphan file: {}", path.display());
                report.removed_files.push(path.to_path_buf());
            }
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", path.display(), e);
                report.failed.push(path.to_path_buf());
            }
        }
    }

    // contents_first yields children before parents, so nested empties collapse
    for dir in dirs {
        let is_empty = std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            match std::fs::remove_dir(&dir) {
                Ok(()) => report.removed_dirs.push(dir),
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", dir.display(), e);
                    report.failed.push(dir);
                }
            }
        }
    }

    Ok(report)
}
