//! Category Row Operations
//!
//! SQL for the `categories` table and the tree index state row. Every
//! function takes the connection it runs on, so callers decide whether a
//! statement participates in a write transaction opened with
//! `DatabaseService::begin_write()`.
//!
//! These functions contain no business rules. Cycle checks, the leaf rule
//! and name uniqueness live in the service layer.

use crate::db::error::DatabaseError;
use crate::models::{Category, TreeFields};
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Row};
use std::collections::HashMap;

/// Column list matching `row_to_category`
const CATEGORY_COLUMNS: &str = "id, name, parent_id, display_order, description, is_active, image, \
     thumbnail_150, thumbnail_800, created_at, updated_at, lft, rgt, tree_id, depth";

/// Parameters for category insertion (avoids too-many-arguments lint)
pub struct DbCreateCategoryParams<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub parent_id: Option<&'a str>,
    pub display_order: u32,
    pub description: &'a str,
    pub is_active: bool,
    pub image: Option<&'a str>,
    pub timestamp: &'a DateTime<Utc>,
}

/// Parent link and ordering data for one category
///
/// This is everything the tree algorithms need; it is much cheaper to load
/// than full rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub id: String,
    pub parent_id: Option<String>,
    pub display_order: u32,
    pub name: String,
}

/// Persisted freshness of the nested-set columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeIndexState {
    pub dirty: bool,
    pub rebuilt_at: Option<DateTime<Utc>>,
    pub rows_indexed: u64,
}

/// Per-category product and child counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryUsage {
    pub id: String,
    pub name: String,
    pub product_count: u64,
    pub child_count: u64,
}

/// Parse a stored timestamp - handles both SQLite and RFC3339 formats
///
/// Rows written by this crate use RFC3339; rows inserted by hand with
/// `CURRENT_TIMESTAMP` use "YYYY-MM-DD HH:MM:SS".
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(DatabaseError::row_decode(
        "timestamp",
        format!("unable to parse '{}' as RFC3339 or SQLite format", s),
    ))
}

pub(crate) fn to_u32(entity: &'static str, column: &str, value: i64) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| {
        DatabaseError::row_decode(entity, format!("{} out of range: {}", column, value))
    })
}

pub(crate) fn to_u64(entity: &'static str, column: &str, value: i64) -> Result<u64, DatabaseError> {
    u64::try_from(value).map_err(|_| {
        DatabaseError::row_decode(entity, format!("{} out of range: {}", column, value))
    })
}

/// SQLite stores booleans as 0/1 integers
pub(crate) fn flag(value: i64) -> bool {
    value != 0
}

/// `row.get` with the column name attached to decode errors
macro_rules! decode {
    ($row:expr, $idx:expr, $column:expr) => {
        $row.get($idx)
            .map_err(|e| DatabaseError::row_decode("category", format!("{}: {}", $column, e)))
    };
}

/// Convert a libsql row (selected with `CATEGORY_COLUMNS`) into a Category
fn row_to_category(row: &Row) -> Result<Category, DatabaseError> {
    let created_at: String = decode!(row, 9, "created_at")?;
    let updated_at: String = decode!(row, 10, "updated_at")?;

    Ok(Category {
        id: decode!(row, 0, "id")?,
        name: decode!(row, 1, "name")?,
        parent_id: decode!(row, 2, "parent_id")?,
        display_order: to_u32("category", "display_order", decode!(row, 3, "display_order")?)?,
        description: decode!(row, 4, "description")?,
        is_active: flag(decode!(row, 5, "is_active")?),
        image: decode!(row, 6, "image")?,
        thumbnail_150: decode!(row, 7, "thumbnail_150")?,
        thumbnail_800: decode!(row, 8, "thumbnail_800")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        tree: TreeFields {
            left: decode!(row, 11, "lft")?,
            right: decode!(row, 12, "rgt")?,
            tree_id: decode!(row, 13, "tree_id")?,
            depth: decode!(row, 14, "depth")?,
        },
    })
}

async fn collect_categories(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<Category>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to query categories: {}", e)))?;

    let mut categories = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        categories.push(row_to_category(&row)?);
    }
    Ok(categories)
}

async fn query_count(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<u64, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to count rows: {}", e)))?;

    let count: i64 = match rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        Some(row) => row
            .get(0)
            .map_err(|e| DatabaseError::row_decode("count", e.to_string()))?,
        None => 0,
    };
    to_u64("count", "COUNT(*)", count)
}

/// Insert a category row with zeroed tree fields
pub async fn insert_category(
    conn: &Connection,
    params: DbCreateCategoryParams<'_>,
) -> Result<(), DatabaseError> {
    let timestamp = params.timestamp.to_rfc3339();

    conn.execute(
        "INSERT INTO categories (id, name, parent_id, display_order, description, is_active, image, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            params.id,
            params.name,
            params.parent_id,
            i64::from(params.display_order),
            params.description,
            i64::from(params.is_active),
            params.image,
            timestamp.as_str(),
            timestamp.as_str(),
        ),
    )
    .await
    .map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to insert category {}: {}", params.id, e))
    })?;

    Ok(())
}

/// Fetch one category by id
pub async fn get_category(conn: &Connection, id: &str) -> Result<Option<Category>, DatabaseError> {
    let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
    Ok(collect_categories(conn, &sql, [id]).await?.into_iter().next())
}

/// Fetch one category by exact name
pub async fn get_category_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<Category>, DatabaseError> {
    let sql = format!("SELECT {} FROM categories WHERE name = ?", CATEGORY_COLUMNS);
    Ok(collect_categories(conn, &sql, [name]).await?.into_iter().next())
}

/// All categories ordered by (display_order, name)
pub async fn list_categories(conn: &Connection) -> Result<Vec<Category>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM categories ORDER BY display_order ASC, name ASC",
        CATEGORY_COLUMNS
    );
    collect_categories(conn, &sql, ()).await
}

/// Active categories ordered by (display_order, name)
pub async fn list_active_categories(conn: &Connection) -> Result<Vec<Category>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM categories WHERE is_active = 1 ORDER BY display_order ASC, name ASC",
        CATEGORY_COLUMNS
    );
    collect_categories(conn, &sql, ()).await
}

/// Nested-set range read: every row strictly inside `(left, right)` of a tree
pub async fn list_index_descendants(
    conn: &Connection,
    tree: &TreeFields,
) -> Result<Vec<Category>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM categories WHERE tree_id = ? AND lft > ? AND lft < ? ORDER BY lft ASC",
        CATEGORY_COLUMNS
    );
    collect_categories(conn, &sql, (tree.tree_id, tree.left, tree.right)).await
}

/// Nested-set range read: every row whose interval strictly contains `tree`
pub async fn list_index_ancestors(
    conn: &Connection,
    tree: &TreeFields,
) -> Result<Vec<Category>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM categories WHERE tree_id = ? AND lft < ? AND rgt > ? ORDER BY lft ASC",
        CATEGORY_COLUMNS
    );
    collect_categories(conn, &sql, (tree.tree_id, tree.left, tree.right)).await
}

pub async fn count_categories(conn: &Connection) -> Result<u64, DatabaseError> {
    query_count(conn, "SELECT COUNT(*) FROM categories", ()).await
}

pub async fn count_children(conn: &Connection, id: &str) -> Result<u64, DatabaseError> {
    query_count(
        conn,
        "SELECT COUNT(*) FROM categories WHERE parent_id = ?",
        [id],
    )
    .await
}

/// Number of products directly assigned to a category
pub async fn count_products(conn: &Connection, id: &str) -> Result<u64, DatabaseError> {
    query_count(
        conn,
        "SELECT COUNT(*) FROM product_categories WHERE category_id = ?",
        [id],
    )
    .await
}

/// Parent links for every category, ordered by (display_order, name)
pub async fn list_links(conn: &Connection) -> Result<Vec<CategoryLink>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, parent_id, display_order, name FROM categories ORDER BY display_order ASC, name ASC",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query category links: {}", e))
        })?;

    let mut links = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        links.push(CategoryLink {
            id: decode!(&row, 0, "id")?,
            parent_id: decode!(&row, 1, "parent_id")?,
            display_order: to_u32("category", "display_order", decode!(&row, 2, "display_order")?)?,
            name: decode!(&row, 3, "name")?,
        });
    }
    Ok(links)
}

/// Parent map (`id -> parent_id`) built from `list_links`
pub async fn parent_map(
    conn: &Connection,
) -> Result<HashMap<String, Option<String>>, DatabaseError> {
    Ok(list_links(conn)
        .await?
        .into_iter()
        .map(|link| (link.id, link.parent_id))
        .collect())
}

/// Product and child counts for every category
pub async fn list_usage(conn: &Connection) -> Result<Vec<CategoryUsage>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT c.id, c.name,
                    (SELECT COUNT(*) FROM product_categories pc WHERE pc.category_id = c.id),
                    (SELECT COUNT(*) FROM categories ch WHERE ch.parent_id = c.id)
             FROM categories c
             ORDER BY c.display_order ASC, c.name ASC",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query category usage: {}", e))
        })?;

    let mut usage = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        usage.push(CategoryUsage {
            id: decode!(&row, 0, "id")?,
            name: decode!(&row, 1, "name")?,
            product_count: to_u64("category", "product_count", decode!(&row, 2, "product_count")?)?,
            child_count: to_u64("category", "child_count", decode!(&row, 3, "child_count")?)?,
        });
    }
    Ok(usage)
}

/// Re-point a category at a new parent (or make it a root)
pub async fn update_parent(
    conn: &Connection,
    id: &str,
    parent_id: Option<&str>,
) -> Result<u64, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE categories SET parent_id = ?, updated_at = ? WHERE id = ?",
        (parent_id, now.as_str(), id),
    )
    .await
    .map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to update parent of {}: {}", id, e))
    })
}

/// Overwrite the non-structural fields of a category
pub async fn update_details(
    conn: &Connection,
    id: &str,
    name: &str,
    description: &str,
    display_order: u32,
    is_active: bool,
) -> Result<u64, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE categories SET name = ?, description = ?, display_order = ?, is_active = ?, updated_at = ? WHERE id = ?",
        (
            name,
            description,
            i64::from(display_order),
            i64::from(is_active),
            now.as_str(),
            id,
        ),
    )
    .await
    .map_err(|e| DatabaseError::sql_execution(format!("Failed to update category {}: {}", id, e)))
}

pub async fn update_thumbnails(
    conn: &Connection,
    id: &str,
    thumbnail_150: &str,
    thumbnail_800: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE categories SET thumbnail_150 = ?, thumbnail_800 = ? WHERE id = ?",
        (thumbnail_150, thumbnail_800, id),
    )
    .await
    .map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to store thumbnails for {}: {}", id, e))
    })
}

/// Write the nested-set columns of one row
pub async fn write_tree_fields(
    conn: &Connection,
    id: &str,
    tree: &TreeFields,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE categories SET lft = ?, rgt = ?, tree_id = ?, depth = ? WHERE id = ?",
        (tree.left, tree.right, tree.tree_id, tree.depth, id),
    )
    .await
    .map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to write tree fields for {}: {}", id, e))
    })
}

pub async fn delete_category(conn: &Connection, id: &str) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM categories WHERE id = ?", [id])
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to delete category {}: {}", id, e))
        })
}

/// Delete every category (assignments go with them through the cascade)
pub async fn delete_all_categories(conn: &Connection) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM categories", ())
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete categories: {}", e)))
}

pub async fn clear_product_assignments(
    conn: &Connection,
    category_id: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM product_categories WHERE category_id = ?",
        [category_id],
    )
    .await
    .map_err(|e| {
        DatabaseError::sql_execution(format!(
            "Failed to clear assignments of {}: {}",
            category_id, e
        ))
    })
}

pub async fn get_index_state(conn: &Connection) -> Result<TreeIndexState, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT dirty, rebuilt_at, rows_indexed FROM tree_index_state WHERE id = 1",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to read tree index state: {}", e))
        })?;

    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    else {
        // Missing state row means nobody ever rebuilt
        return Ok(TreeIndexState {
            dirty: true,
            rebuilt_at: None,
            rows_indexed: 0,
        });
    };

    let rebuilt_at: Option<String> = decode!(&row, 1, "rebuilt_at")?;
    Ok(TreeIndexState {
        dirty: flag(decode!(&row, 0, "dirty")?),
        rebuilt_at: rebuilt_at.as_deref().map(parse_timestamp).transpose()?,
        rows_indexed: to_u64("tree_index_state", "rows_indexed", decode!(&row, 2, "rows_indexed")?)?,
    })
}

/// Flag the nested-set columns as stale after a structural edit
pub async fn mark_index_dirty(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO tree_index_state (id, dirty) VALUES (1, 1)
         ON CONFLICT(id) DO UPDATE SET dirty = 1",
        (),
    )
    .await
    .map_err(|e| DatabaseError::sql_execution(format!("Failed to mark index dirty: {}", e)))?;
    Ok(())
}

/// Record a completed rebuild
pub async fn mark_index_clean(conn: &Connection, rows_indexed: u64) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let rows_indexed = i64::try_from(rows_indexed).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO tree_index_state (id, dirty, rebuilt_at, rows_indexed) VALUES (1, 0, ?, ?)
         ON CONFLICT(id) DO UPDATE SET dirty = 0, rebuilt_at = excluded.rebuilt_at, rows_indexed = excluded.rows_indexed",
        (now.as_str(), rows_indexed),
    )
    .await
    .map_err(|e| DatabaseError::sql_execution(format!("Failed to mark index clean: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2025-01-03T10:15:00+00:00").unwrap();
        let sqlite = parse_timestamp("2025-01-03 10:15:00").unwrap();
        assert_eq!(rfc, sqlite);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_out_of_range_order_rejected() {
        assert!(to_u32("category", "display_order", -1).is_err());
        assert_eq!(to_u32("category", "display_order", 7).unwrap(), 7);
    }
}
