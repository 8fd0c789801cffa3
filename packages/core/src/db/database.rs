//! Database Connection Management
//!
//! This module provides the core database connection and initialization
//! functionality using libsql for the catalog tables.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging so readers never block on the writer
//! - **Foreign keys**: Enabled on every connection (parent deletion cascades)
//! - **Write transactions**: `BEGIN IMMEDIATE` takes the write lock up front,
//!   so validation reads and the following writes are one atomic unit
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async functions. Each multi-statement
//! mutation opens its own connection with `begin_write()` and ends with
//! `finish_write()`, which commits on `Ok` and rolls back on `Err`. A dropped
//! connection with an open transaction is rolled back by SQLite on close.
//!
//! ```no_run
//! # use storefront_core::db::{DatabaseError, DatabaseService};
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseService::new(PathBuf::from("./data/storefront.db")).await?;
//! let conn = db.begin_write().await?;
//! let result: Result<u64, DatabaseError> = conn
//!     .execute("UPDATE categories SET is_active = 1", ())
//!     .await
//!     .map_err(DatabaseError::from);
//! let updated = DatabaseService::finish_write(&conn, result).await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Busy timeout applied to every connection (milliseconds)
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Seed the tree index state row (index starts out stale)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        tracing::debug!("Opened catalog database at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements may return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// # Schema
    ///
    /// - `categories`: category rows, parent links and nested-set columns
    ///   (`lft`, `rgt`, `tree_id`, `depth`)
    /// - `products`: catalog products (price stored as decimal text)
    /// - `product_categories`: many-to-many assignment
    /// - `tree_index_state`: single row holding the index dirty flag
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                parent_id TEXT,
                display_order INTEGER NOT NULL DEFAULT 0 CHECK (display_order >= 0),
                description TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                image TEXT,
                thumbnail_150 TEXT,
                thumbnail_800 TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                lft INTEGER NOT NULL DEFAULT 0,
                rgt INTEGER NOT NULL DEFAULT 0,
                tree_id INTEGER NOT NULL DEFAULT 0,
                depth INTEGER NOT NULL DEFAULT 0,
                -- Parent deletion cascades to the whole subtree
                FOREIGN KEY (parent_id) REFERENCES categories(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create categories table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price TEXT NOT NULL,
                stock_quantity INTEGER NOT NULL DEFAULT 0 CHECK (stock_quantity >= 0),
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create products table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS product_categories (
                product_id TEXT NOT NULL,
                category_id TEXT NOT NULL,
                PRIMARY KEY (product_id, category_id),
                FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create product_categories table: {}",
                e
            ))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tree_index_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                dirty INTEGER NOT NULL DEFAULT 1,
                rebuilt_at TEXT,
                rows_indexed INTEGER NOT NULL DEFAULT 0
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create tree_index_state table: {}",
                e
            ))
        })?;

        // A database that has never been rebuilt has a stale index
        conn.execute(
            "INSERT OR IGNORE INTO tree_index_state (id, dirty, rebuilt_at, rows_indexed) VALUES (1, 1, NULL, 0)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to seed tree_index_state: {}", e))
        })?;

        self.create_indexes(&conn).await?;

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create secondary indexes used by the tree and assignment queries
    async fn create_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let statements = [
            (
                "idx_categories_parent",
                "CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id)",
            ),
            (
                "idx_categories_order",
                "CREATE INDEX IF NOT EXISTS idx_categories_order ON categories(display_order, name)",
            ),
            (
                "idx_categories_tree",
                "CREATE INDEX IF NOT EXISTS idx_categories_tree ON categories(tree_id, lft)",
            ),
            (
                "idx_product_categories_category",
                "CREATE INDEX IF NOT EXISTS idx_product_categories_category ON product_categories(category_id)",
            ),
        ];

        for (name, sql) in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create {}: {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Get a raw connection handle
    ///
    /// Prefer `connect_with_timeout()`; this one skips the per-connection
    /// pragmas, so foreign keys are not guaranteed to be enforced.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout and foreign keys configured
    ///
    /// Sets a 5-second busy timeout so concurrent writers wait for the lock
    /// instead of failing immediately with `SQLITE_BUSY`.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Open a connection and start a write transaction on it
    ///
    /// `BEGIN IMMEDIATE` acquires the database write lock before the first
    /// read, serializing read-validate-write sequences across connections.
    pub async fn begin_write(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(conn)
    }

    /// Open a connection and start a read transaction on it
    ///
    /// Reads inside see one snapshot of the database. End it with
    /// `finish_write()` like a write transaction.
    pub async fn begin_read(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN DEFERRED", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin read transaction: {}", e))
        })?;

        Ok(conn)
    }

    /// End a transaction started by `begin_write()` or `begin_read()`
    ///
    /// Commits when `result` is `Ok`, rolls back when it is `Err`, and hands
    /// the result back unchanged (or a commit failure).
    pub async fn finish_write<T, E>(
        conn: &libsql::Connection,
        result: Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        match result {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    ))
                    .into());
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = conn.execute("ROLLBACK", ()).await {
                    tracing::warn!("Failed to roll back transaction: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Flush the WAL into the main database file
    pub async fn checkpoint(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn table_names(db: &DatabaseService) -> Vec<String> {
        let conn = db.connect_with_timeout().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
                (),
            )
            .await
            .unwrap();

        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }
        names
    }

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db_service = DatabaseService::new(db_path.clone()).await.unwrap();

        assert_eq!(db_service.db_path, db_path);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let names = table_names(&db_service).await;
        for expected in [
            "categories",
            "product_categories",
            "products",
            "tree_index_state",
        ] {
            assert!(
                names.contains(&expected.to_string()),
                "missing table {}: {:?}",
                expected,
                names
            );
        }
    }

    #[tokio::test]
    async fn test_indexes_created() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let conn = db_service.connect_with_timeout().await.unwrap();

        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'",
                (),
            )
            .await
            .unwrap();

        let mut index_names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            index_names.push(row.get::<String>(0).unwrap());
        }

        assert!(index_names.contains(&"idx_categories_parent".to_string()));
        assert!(index_names.contains(&"idx_categories_order".to_string()));
        assert!(index_names.contains(&"idx_categories_tree".to_string()));
        assert!(index_names.contains(&"idx_product_categories_category".to_string()));
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let conn = db_service.connect_with_timeout().await.unwrap();

        let mut rows = conn.query("PRAGMA foreign_keys", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let enabled: i64 = row.get(0).unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_checkpoint_keeps_committed_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db_service = DatabaseService::new(db_path.clone()).await.unwrap();

        let conn = db_service.begin_write().await.unwrap();
        let result: Result<u64, DatabaseError> = conn
            .execute(
                "INSERT INTO products (id, name, description, price, stock_quantity, is_active, created_at, updated_at)
                 VALUES ('p1', 'Lamp', '', '1.00', 0, 1, '2025-01-01T00:00:00+00:00', '2025-01-01T00:00:00+00:00')",
                (),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()));
        DatabaseService::finish_write(&conn, result).await.unwrap();
        drop(conn);

        db_service.checkpoint().await.unwrap();

        let reopened = DatabaseService::new(db_path).await.unwrap();
        let conn = reopened.connect_with_timeout().await.unwrap();
        let mut rows = conn.query("SELECT COUNT(*) FROM products", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_tree_index_starts_dirty() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let conn = db_service.connect_with_timeout().await.unwrap();

        let mut rows = conn
            .query("SELECT dirty FROM tree_index_state WHERE id = 1", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let dirty: i64 = row.get(0).unwrap();
        assert_eq!(dirty, 1);
    }

    #[tokio::test]
    async fn test_parent_directory_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("dirs").join("test.db");

        let _db_service = DatabaseService::new(nested_path.clone()).await.unwrap();

        assert!(nested_path.exists());
    }

    #[tokio::test]
    async fn test_idempotent_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let _first = DatabaseService::new(db_path.clone()).await.unwrap();
        let second = DatabaseService::new(db_path).await.unwrap();

        let conn = second.connect_with_timeout().await.unwrap();
        let mut rows = conn
            .query("SELECT COUNT(*) FROM tree_index_state", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 1, "state row must not be duplicated");
    }

    #[tokio::test]
    async fn test_finish_write_rolls_back_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let db_service = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let conn = db_service.begin_write().await.unwrap();
        conn.execute("UPDATE tree_index_state SET rows_indexed = 42", ())
            .await
            .unwrap();
        let failed: Result<(), DatabaseError> = Err(DatabaseError::sql_execution("boom"));
        assert!(DatabaseService::finish_write(&conn, failed).await.is_err());

        let reader = db_service.connect_with_timeout().await.unwrap();
        let mut rows = reader
            .query("SELECT rows_indexed FROM tree_index_state", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let rows_indexed: i64 = row.get(0).unwrap();
        assert_eq!(rows_indexed, 0);
    }
}
