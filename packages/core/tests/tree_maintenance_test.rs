//! Integration tests for TreeMaintenance
//!
//! Tests cover:
//! - Rebuild producing a well-formed nested-set index
//! - Verify detecting a changed category count
//! - Backup / rollback round trips, declined confirmations and refused snapshots
//! - Rollback failing between its two passes
//! - The `run` workflow, integrity audit and orphan image cleanup

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use storefront_core::db::events::DomainEvent;
use storefront_core::db::{category_store, DatabaseService};
use storefront_core::models::{Category, NewCategory, NewProduct};
use storefront_core::services::maintenance::{SnapshotItem, SnapshotMetadata};
use storefront_core::services::{
    AssumeYes, CatalogServiceError, CategoryService, CategorySnapshot, ConfirmationGate,
    ConventionalThumbnailHandles, DeletePolicy, MaintenanceOutcome, MaintenancePlan,
    ProductService, TreeMaintenance,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

struct Decline;

impl ConfirmationGate for Decline {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

struct Fixture {
    db: Arc<DatabaseService>,
    categories: CategoryService,
    maintenance: TreeMaintenance,
    temp: TempDir,
}

impl Fixture {
    fn path(&self, name: &str) -> std::path::PathBuf {
        self.temp.path().join(name)
    }
}

async fn fixture() -> Result<Fixture> {
    let temp = TempDir::new()?;
    let db = Arc::new(DatabaseService::new(temp.path().join("catalog.db")).await?);
    Ok(Fixture {
        categories: CategoryService::new(db.clone()),
        maintenance: TreeMaintenance::new(db.clone()),
        db,
        temp,
    })
}

/// Root -> A -> A1, Root -> B, plus an inactive root C
async fn seed(f: &Fixture) -> Result<HashMap<String, Category>> {
    let root = f.categories.create_category(NewCategory::new("Root")).await?;
    let a = f
        .categories
        .create_category(NewCategory::new("A").with_parent(&root.id).with_display_order(2))
        .await?;
    let a1 = f
        .categories
        .create_category(
            NewCategory::new("A1")
                .with_parent(&a.id)
                .with_description("deepest"),
        )
        .await?;
    let b = f
        .categories
        .create_category(NewCategory::new("B").with_parent(&root.id).with_display_order(1))
        .await?;
    let c = f
        .categories
        .create_category(NewCategory::new("C").inactive())
        .await?;

    Ok([root, a, a1, b, c]
        .into_iter()
        .map(|category| (category.name.clone(), category))
        .collect())
}

async fn by_name(f: &Fixture) -> Result<HashMap<String, Category>> {
    Ok(f
        .categories
        .list_all()
        .await?
        .into_iter()
        .map(|category| (category.name.clone(), category))
        .collect())
}

/// Parent chain of a category expressed as names, nearest first
fn name_chain(all: &HashMap<String, Category>, name: &str) -> Vec<String> {
    let by_id: HashMap<&str, &Category> = all.values().map(|c| (c.id.as_str(), c)).collect();
    let mut chain = Vec::new();
    let mut current = all[name].parent_id.as_deref();
    while let Some(id) = current {
        let parent = by_id[id];
        chain.push(parent.name.clone());
        current = parent.parent_id.as_deref();
    }
    chain
}

#[tokio::test]
async fn test_rebuild_produces_nested_intervals() -> Result<()> {
    let f = fixture().await?;
    seed(&f).await?;

    let written = f.maintenance.rebuild_index().await?;
    assert_eq!(written, 5);

    let all = by_name(&f).await?;
    let by_id: HashMap<&str, &Category> = all.values().map(|c| (c.id.as_str(), c)).collect();
    for category in all.values() {
        let fields = category.tree;
        assert!(fields.left < fields.right, "{}", category.name);
        match category.parent_id.as_deref() {
            Some(parent_id) => {
                let parent = by_id[parent_id].tree;
                assert!(parent.is_ancestor_of(&fields), "{}", category.name);
                assert_eq!(fields.depth, parent.depth + 1);
                assert_eq!(fields.tree_id, parent.tree_id);
            }
            None => {
                assert_eq!(fields.depth, 0);
                assert_eq!(fields.left, 1);
            }
        }
    }

    // B sorts before A by display_order
    assert!(all["B"].tree.left < all["A"].tree.left);
    assert_eq!(all["Root"].tree.descendant_count(), 3);
    assert_ne!(all["Root"].tree.tree_id, all["C"].tree.tree_id);

    let conn = f.db.connect_with_timeout().await?;
    let state = category_store::get_index_state(&conn).await?;
    assert!(!state.dirty);
    assert_eq!(state.rows_indexed, 5);
    Ok(())
}

#[tokio::test]
async fn test_rebuild_empty_table() -> Result<()> {
    let f = fixture().await?;
    assert_eq!(f.maintenance.rebuild_index().await?, 0);
    assert_eq!(f.maintenance.verify(0).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_rebuild_refuses_corrupt_cycle() -> Result<()> {
    let f = fixture().await?;
    let x = f.categories.create_category(NewCategory::new("X")).await?;
    let y = f.categories.create_category(NewCategory::new("Y")).await?;
    f.maintenance.rebuild_index().await?;
    let before = by_name(&f).await?;

    let conn = f.db.connect_with_timeout().await?;
    category_store::update_parent(&conn, &x.id, Some(y.id.as_str())).await?;
    category_store::update_parent(&conn, &y.id, Some(x.id.as_str())).await?;

    let err = f.maintenance.rebuild_index().await.unwrap_err();
    assert!(matches!(err, CatalogServiceError::Integrity { .. }));

    let after = by_name(&f).await?;
    assert_eq!(after["X"].tree, before["X"].tree);
    assert_eq!(after["Y"].tree, before["Y"].tree);
    Ok(())
}

#[tokio::test]
async fn test_verify_detects_dropped_row() -> Result<()> {
    let f = fixture().await?;
    let seeded = seed(&f).await?;
    let before = f.maintenance.count().await?;
    f.maintenance.rebuild_index().await?;

    let conn = f.db.connect_with_timeout().await?;
    conn.execute("DELETE FROM categories WHERE id = ?", [seeded["C"].id.as_str()])
        .await?;

    match f.maintenance.verify(before).await {
        Err(CatalogServiceError::Consistency { before, after }) => {
            assert_eq!(before, 5);
            assert_eq!(after, 4);
        }
        other => panic!("expected Consistency, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_backup_and_rollback_round_trip() -> Result<()> {
    let f = fixture().await?;
    let (tx, mut events) = broadcast::channel(16);
    let maintenance = TreeMaintenance::new(f.db.clone()).with_events(tx);
    seed(&f).await?;
    let original = by_name(&f).await?;

    let backup_path = f.path("backups/categories.json");
    let summary = maintenance.backup(&backup_path).await?;
    assert_eq!(summary.item_count, 5);
    assert!(backup_path.is_file());

    // Damage the store
    f.categories
        .delete_category(&original["Root"].id, DeletePolicy::Cascade)
        .await?;
    f.categories.create_category(NewCategory::new("Stray")).await?;

    let outcome = maintenance.rollback(&backup_path, &AssumeYes).await?;
    let rollback = outcome.completed().unwrap();
    assert_eq!(rollback.restored, 5);
    assert_eq!(rollback.linked, 3);
    assert!(rollback.orphaned.is_empty());

    let restored = by_name(&f).await?;
    assert_eq!(restored.len(), 5);
    assert!(!restored.contains_key("Stray"));
    for (name, before) in &original {
        let after = &restored[name];
        assert_eq!(after.id, before.id);
        assert_eq!(after.display_order, before.display_order);
        assert_eq!(after.is_active, before.is_active);
        assert_eq!(after.description, before.description);
        assert_eq!(name_chain(&restored, name), name_chain(&original, name));
    }

    // Restored rows need a rebuild before the index is trusted again
    let conn = f.db.connect_with_timeout().await?;
    assert!(category_store::get_index_state(&conn).await?.dirty);
    assert_eq!(maintenance.rebuild_index().await?, 5);

    assert!(matches!(
        events.try_recv()?,
        DomainEvent::CategoriesRestored { restored: 5 }
    ));
    Ok(())
}

#[tokio::test]
async fn test_declined_confirmation_changes_nothing() -> Result<()> {
    let f = fixture().await?;
    seed(&f).await?;
    let backup_path = f.path("backup.json");
    f.maintenance.backup(&backup_path).await?;
    f.categories.create_category(NewCategory::new("After backup")).await?;

    let outcome = f.maintenance.rollback(&backup_path, &Decline).await?;
    assert!(outcome.is_aborted());
    assert_eq!(f.maintenance.count().await?, 6);

    let rebuild = f.maintenance.rebuild(&Decline).await?;
    assert_eq!(rebuild, MaintenanceOutcome::Aborted);
    let conn = f.db.connect_with_timeout().await?;
    assert!(category_store::get_index_state(&conn).await?.dirty);
    Ok(())
}

#[tokio::test]
async fn test_cyclic_snapshot_is_refused_before_deleting() -> Result<()> {
    let f = fixture().await?;
    seed(&f).await?;

    let item = |id: &str, parent: &str| SnapshotItem {
        id: id.to_string(),
        category_name: format!("name-{}", id),
        parent_id: Some(parent.to_string()),
        display_order: 0,
        description: String::new(),
        is_active: true,
    };
    let snapshot = CategorySnapshot {
        metadata: SnapshotMetadata {
            created_timestamp: Utc::now(),
            item_count: 2,
        },
        items: vec![item("a", "b"), item("b", "a")],
    };
    let path = f.path("cyclic.json");
    snapshot.write_to(&path).await?;

    let err = f.maintenance.rollback(&path, &AssumeYes).await.unwrap_err();
    assert!(matches!(err, CatalogServiceError::Cycle { .. }));
    assert_eq!(f.maintenance.count().await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_with_missing_parent_restores_root() -> Result<()> {
    let f = fixture().await?;
    let snapshot = CategorySnapshot {
        metadata: SnapshotMetadata {
            created_timestamp: Utc::now(),
            item_count: 1,
        },
        items: vec![SnapshotItem {
            id: "lonely".to_string(),
            category_name: "Lonely".to_string(),
            parent_id: Some("gone".to_string()),
            display_order: 4,
            description: String::new(),
            is_active: true,
        }],
    };

    let summary = f.maintenance.restore(&snapshot).await?;
    assert_eq!(summary.orphaned, vec!["lonely".to_string()]);
    assert_eq!(summary.linked, 0);
    let lonely = f.categories.get_category("lonely").await?.unwrap();
    assert!(lonely.is_root());
    assert_eq!(lonely.display_order, 4);
    Ok(())
}

#[tokio::test]
async fn test_rollback_link_failure_leaves_parentless_rows() -> Result<()> {
    let f = fixture().await?;
    seed(&f).await?;
    let backup_path = f.path("backup.json");
    f.maintenance.backup(&backup_path).await?;

    let conn = f.db.connect_with_timeout().await?;
    conn.execute(
        "CREATE TRIGGER refuse_links BEFORE UPDATE OF parent_id ON categories
         BEGIN SELECT RAISE(ABORT, 'link refused'); END",
        (),
    )
    .await?;

    let err = f
        .maintenance
        .rollback(&backup_path, &AssumeYes)
        .await
        .unwrap_err();
    match err {
        CatalogServiceError::RollbackLinkFailed { restored, .. } => assert_eq!(restored, 5),
        other => panic!("expected RollbackLinkFailed, got {:?}", other),
    }

    let all = f.categories.list_all().await?;
    assert_eq!(all.len(), 5);
    assert!(all.iter().all(Category::is_root));
    Ok(())
}

#[tokio::test]
async fn test_run_backup_rebuild_verify() -> Result<()> {
    let f = fixture().await?;
    seed(&f).await?;

    let plan = MaintenancePlan {
        backup: Some(f.path("run/backup.json")),
        rebuild: true,
        verify: true,
        rollback: None,
    };
    let report = f.maintenance.run(&plan, &AssumeYes).await?;
    assert_eq!(report.backup.as_ref().map(|b| b.item_count), Some(5));
    assert_eq!(report.count_before, Some(5));
    assert_eq!(report.rows_rebuilt, Some(5));
    assert_eq!(report.count_after, Some(5));
    assert!(!report.aborted);

    let declined = f.maintenance.run(&plan, &Decline).await?;
    assert!(declined.aborted);
    assert_eq!(declined.rows_rebuilt, None);
    assert_eq!(declined.count_after, None);
    Ok(())
}

#[tokio::test]
async fn test_run_reports_failed_step() -> Result<()> {
    let f = fixture().await?;
    seed(&f).await?;

    // A regular file where the backup directory should be
    let blocker = f.path("blocker");
    std::fs::write(&blocker, b"not a directory")?;
    let plan = MaintenancePlan {
        backup: Some(blocker.join("backup.json")),
        rebuild: true,
        ..Default::default()
    };
    let err = f.maintenance.run(&plan, &AssumeYes).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("backup"));

    let conn = f.db.connect_with_timeout().await?;
    assert!(category_store::get_index_state(&conn).await?.dirty, "rebuild never ran");

    let plan = MaintenancePlan {
        rollback: Some(f.path("missing.json")),
        rebuild: true,
        ..Default::default()
    };
    let err = f.maintenance.run(&plan, &AssumeYes).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("rollback"));
    assert_eq!(f.maintenance.count().await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_check_integrity_reports_and_fixes() -> Result<()> {
    let f = fixture().await?;
    let seeded = seed(&f).await?;
    let products = ProductService::new(f.db.clone());
    let lamp = products
        .create_product(NewProduct::new("Lamp", Decimal::new(2500, 2)))
        .await?;

    // Legacy row: a product sitting on a parent category
    let conn = f.db.connect_with_timeout().await?;
    conn.execute(
        "INSERT INTO product_categories (product_id, category_id) VALUES (?, ?)",
        (lamp.id.as_str(), seeded["A"].id.as_str()),
    )
    .await?;

    let report = f.maintenance.check_integrity(false).await?;
    assert!(!report.is_clean());
    assert_eq!(report.leaf_rule_violations.len(), 1);
    assert_eq!(report.leaf_rule_violations[0].category_name, "A");
    assert_eq!(report.leaf_rule_violations[0].product_count, 1);
    assert_eq!(report.leaf_rule_violations[0].child_count, 1);
    assert_eq!(report.assignments_cleared, 0);
    assert_eq!(products.category_ids(&lamp.id).await?.len(), 1);

    let fixed = f.maintenance.check_integrity(true).await?;
    assert_eq!(fixed.assignments_cleared, 1);
    assert!(products.category_ids(&lamp.id).await?.is_empty());
    assert!(f.maintenance.check_integrity(false).await?.is_clean());
    Ok(())
}

#[tokio::test]
async fn test_check_integrity_reports_cycles() -> Result<()> {
    let f = fixture().await?;
    let x = f.categories.create_category(NewCategory::new("X")).await?;
    let y = f.categories.create_category(NewCategory::new("Y")).await?;
    f.categories.create_category(NewCategory::new("Fine")).await?;

    let conn = f.db.connect_with_timeout().await?;
    category_store::update_parent(&conn, &x.id, Some(y.id.as_str())).await?;
    category_store::update_parent(&conn, &y.id, Some(x.id.as_str())).await?;

    let report = f.maintenance.check_integrity(true).await?;
    let mut expected = vec![x.id, y.id];
    expected.sort();
    assert_eq!(report.cycle_members, expected);
    assert!(report.leaf_rule_violations.is_empty());
    Ok(())
}

fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, b"img")?;
    Ok(())
}

#[tokio::test]
async fn test_cleanup_orphan_images() -> Result<()> {
    let f = fixture().await?;
    let media = f.path("media");
    let categories =
        CategoryService::new(f.db.clone()).with_image_pipeline(Arc::new(ConventionalThumbnailHandles));

    let shoes = categories
        .create_category(NewCategory::new("Shoes").with_image("categories/uploads/shoes.png"))
        .await?;
    let handles: Vec<String> = shoes.image_handles().map(str::to_string).collect();
    assert_eq!(handles.len(), 3);
    for handle in &handles {
        touch(&media.join(handle))?;
    }
    touch(&media.join("categories/uploads/old.png"))?;
    touch(&media.join("categories/deleted-id/thumbs/old_150x150.jpg"))?;
    touch(&media.join("unrelated/keep.txt"))?;

    let report = f.maintenance.cleanup_orphan_images(&media).await?;
    assert_eq!(report.kept_files, 3);
    assert_eq!(report.removed_files.len(), 2);
    assert_eq!(report.removed_dirs.len(), 2);
    assert!(report.failed.is_empty());

    for handle in &handles {
        assert!(media.join(handle).is_file(), "{} kept", handle);
    }
    assert!(!media.join("categories/deleted-id").exists());
    assert!(media.join("categories").is_dir());
    assert!(media.join("unrelated/keep.txt").is_file());
    Ok(())
}
