//! Product and Assignment Row Operations
//!
//! SQL for `products` and the `product_categories` join table. Like
//! `category_store`, every function runs on the connection it is given.

use crate::db::category_store::{flag, parse_timestamp, to_u32};
use crate::db::error::DatabaseError;
use crate::models::{Product, TreeFields};
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Row, Value};
use rust_decimal::Decimal;
use std::str::FromStr;

const PRODUCT_COLUMNS: &str =
    "p.id, p.name, p.description, p.price, p.stock_quantity, p.is_active, p.created_at, p.updated_at";

/// Parameters for product insertion
pub struct DbCreateProductParams<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub price: &'a Decimal,
    pub stock_quantity: u32,
    pub is_active: bool,
    pub timestamp: &'a DateTime<Utc>,
}

/// `row.get` with the column name attached to decode errors
macro_rules! decode {
    ($row:expr, $idx:expr, $column:expr) => {
        $row.get($idx)
            .map_err(|e| DatabaseError::row_decode("product", format!("{}: {}", $column, e)))
    };
}

fn row_to_product(row: &Row) -> Result<Product, DatabaseError> {
    let price: String = decode!(row, 3, "price")?;
    let created_at: String = decode!(row, 6, "created_at")?;
    let updated_at: String = decode!(row, 7, "updated_at")?;

    Ok(Product {
        id: decode!(row, 0, "id")?,
        name: decode!(row, 1, "name")?,
        description: decode!(row, 2, "description")?,
        price: Decimal::from_str(&price).map_err(|e| {
            DatabaseError::row_decode("product", format!("price '{}': {}", price, e))
        })?,
        stock_quantity: to_u32("product", "stock_quantity", decode!(row, 4, "stock_quantity")?)?,
        is_active: flag(decode!(row, 5, "is_active")?),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

async fn collect_products(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<Product>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to query products: {}", e)))?;

    let mut products = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        products.push(row_to_product(&row)?);
    }
    Ok(products)
}

async fn collect_ids(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<String>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to query ids: {}", e)))?;

    let mut ids = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        ids.push(
            row.get::<String>(0)
                .map_err(|e| DatabaseError::row_decode("id", e.to_string()))?,
        );
    }
    Ok(ids)
}

/// Ids bound per `IN (...)` query; SQLite caps bound parameters at 32766
pub const MAX_IN_LIST: usize = 500;

/// `?, ?, ?` placeholder list plus the matching positional values
fn in_list(ids: &[String]) -> (String, Vec<Value>) {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let values = ids.iter().map(|id| Value::Text(id.clone())).collect();
    (placeholders, values)
}

pub async fn insert_product(
    conn: &Connection,
    params: DbCreateProductParams<'_>,
) -> Result<(), DatabaseError> {
    let timestamp = params.timestamp.to_rfc3339();
    let price = params.price.to_string();

    conn.execute(
        "INSERT INTO products (id, name, description, price, stock_quantity, is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        (
            params.id,
            params.name,
            params.description,
            price.as_str(),
            i64::from(params.stock_quantity),
            i64::from(params.is_active),
            timestamp.as_str(),
            timestamp.as_str(),
        ),
    )
    .await
    .map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to insert product {}: {}", params.id, e))
    })?;

    Ok(())
}

pub async fn get_product(conn: &Connection, id: &str) -> Result<Option<Product>, DatabaseError> {
    let sql = format!("SELECT {} FROM products p WHERE p.id = ?", PRODUCT_COLUMNS);
    Ok(collect_products(conn, &sql, [id]).await?.into_iter().next())
}

/// Category ids currently assigned to a product
pub async fn product_category_ids(
    conn: &Connection,
    product_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    collect_ids(
        conn,
        "SELECT category_id FROM product_categories WHERE product_id = ? ORDER BY category_id",
        [product_id],
    )
    .await
}

/// Which of `ids` exist in the categories table
pub async fn existing_category_ids(
    conn: &Connection,
    ids: &[String],
) -> Result<Vec<String>, DatabaseError> {
    let mut existing = Vec::new();
    for chunk in ids.chunks(MAX_IN_LIST) {
        let (placeholders, values) = in_list(chunk);
        let sql = format!("SELECT id FROM categories WHERE id IN ({})", placeholders);
        existing.extend(collect_ids(conn, &sql, Params::Positional(values)).await?);
    }
    Ok(existing)
}

/// Which of `ids` have at least one child category
pub async fn category_ids_with_children(
    conn: &Connection,
    ids: &[String],
) -> Result<Vec<String>, DatabaseError> {
    let mut parents = Vec::new();
    for chunk in ids.chunks(MAX_IN_LIST) {
        let (placeholders, values) = in_list(chunk);
        let sql = format!(
            "SELECT DISTINCT parent_id FROM categories WHERE parent_id IN ({})",
            placeholders
        );
        parents.extend(collect_ids(conn, &sql, Params::Positional(values)).await?);
    }
    Ok(parents)
}

/// Replace a product's category set with `category_ids`
pub async fn replace_assignments(
    conn: &Connection,
    product_id: &str,
    category_ids: &[String],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM product_categories WHERE product_id = ?",
        [product_id],
    )
    .await
    .map_err(|e| {
        DatabaseError::sql_execution(format!(
            "Failed to clear categories of product {}: {}",
            product_id, e
        ))
    })?;

    for category_id in category_ids {
        conn.execute(
            "INSERT INTO product_categories (product_id, category_id) VALUES (?, ?)",
            (product_id, category_id.as_str()),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to assign category {} to product {}: {}",
                category_id, product_id, e
            ))
        })?;
    }

    Ok(())
}

/// Distinct products assigned to any of `category_ids`, ordered by name
///
/// Large id sets are queried in chunks of [`MAX_IN_LIST`] and merged.
pub async fn products_in_categories(
    conn: &Connection,
    category_ids: &[String],
) -> Result<Vec<Product>, DatabaseError> {
    let mut products = Vec::new();
    for chunk in category_ids.chunks(MAX_IN_LIST) {
        let (placeholders, values) = in_list(chunk);
        let sql = format!(
            "SELECT DISTINCT {} FROM products p
             JOIN product_categories pc ON pc.product_id = p.id
             WHERE pc.category_id IN ({})",
            PRODUCT_COLUMNS, placeholders
        );
        products.extend(collect_products(conn, &sql, Params::Positional(values)).await?);
    }
    Ok(sort_and_dedup(products))
}

/// Order by (name, id) and drop products matched through several chunks
fn sort_and_dedup(mut products: Vec<Product>) -> Vec<Product> {
    products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    products.dedup_by(|a, b| a.id == b.id);
    products
}

/// Distinct products assigned to any category inside the interval `tree`
/// (inclusive of the node itself), ordered by name
pub async fn products_in_interval(
    conn: &Connection,
    tree: &TreeFields,
) -> Result<Vec<Product>, DatabaseError> {
    let sql = format!(
        "SELECT DISTINCT {} FROM products p
         JOIN product_categories pc ON pc.product_id = p.id
         JOIN categories c ON c.id = pc.category_id
         WHERE c.tree_id = ? AND c.lft >= ? AND c.lft < ?
         ORDER BY p.name ASC, p.id ASC",
        PRODUCT_COLUMNS
    );
    collect_products(conn, &sql, (tree.tree_id, tree.left, tree.right)).await
}
