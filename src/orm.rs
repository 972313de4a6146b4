//! Thin async ORM over sqlx + SQLite.
//!
//! Usage:
//! let db = Db::connect("sqlite::memory:").await?;
//! auto_migrate(Arc::new(db.clone())).await?;
//! let rows: Vec<(i64,)> = db.fetch_all("SELECT id FROM student").await?;
pub use futures::future::BoxFuture;
use log::{debug, info};
use sha2::{Digest, Sha256};
pub use sqlx::FromRow;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use walkdir::WalkDir;

const MIGRATIONS_TABLE: &str = "__campus_migrations";

/// An async database pool wrapper.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

/// Migration function pointer for a model.
pub type MigrationFn = fn(Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>>;

/// A model migration registered with `inventory::submit!`.
pub struct Migration(pub MigrationFn);

inventory::collect!(Migration);

#[async_trait::async_trait]
pub trait Model: Send + Sync {
    fn table_name() -> &'static str;
    fn create_table_sql() -> String;
    fn columns() -> Vec<(String, String)>;

    /// Create the table on first run, add missing columns afterwards.
    async fn migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
        let table_name = Self::table_name();
        let create_sql = Self::create_table_sql();
        let schema_hash = hash(&create_sql);

        ensure_migrations_table(&db).await?;

        let row = db
            .fetch_all::<(String,)>(&format!(
                "SELECT hash FROM {} WHERE table_name = '{}'",
                MIGRATIONS_TABLE, table_name
            ))
            .await?;

        let Some((recorded_hash,)) = row.into_iter().next() else {
            db.execute(&create_sql).await?;
            db.execute(&format!(
                "INSERT INTO {} (table_name, schema_sql, hash) VALUES ('{}', '{}', '{}')",
                MIGRATIONS_TABLE,
                table_name,
                escape_sql_quote(&create_sql),
                schema_hash
            ))
            .await?;
            info!("Migrated `{}` (table created).", table_name);
            return Ok(());
        };

        if recorded_hash == schema_hash {
            info!("No schema changes detected for `{}`.", table_name);
            return Ok(());
        }

        let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(&db.pool)
            .await?
            .into_iter()
            .map(|row: sqlx::sqlite::SqliteRow| row.get::<String, _>("name"))
            .collect();

        let mut added = Vec::new();
        for (name, sqltype) in Self::columns() {
            if !existing.contains(&name) {
                db.execute(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table_name, name, sqltype
                ))
                .await?;
                added.push((name, sqltype));
            }
        }

        for (name, sqltype) in &added {
            info!("Added column `{}.{}` {}", table_name, name, sqltype);
        }
        db.execute(&format!(
            "UPDATE {} SET schema_sql = '{}', hash = '{}', applied_at = CURRENT_TIMESTAMP \
             WHERE table_name = '{}'",
            MIGRATIONS_TABLE,
            escape_sql_quote(&create_sql),
            schema_hash,
            table_name
        ))
        .await?;
        Ok(())
    }
}

fn escape_sql_quote(sql: &str) -> String {
    sql.replace('\'', "''")
}

fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

// Model migrations and file migrations share one bookkeeping table.
async fn ensure_migrations_table(db: &Db) -> Result<(), sqlx::Error> {
    db.execute(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT UNIQUE,
            table_name TEXT UNIQUE,
            schema_sql TEXT,
            hash TEXT,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        MIGRATIONS_TABLE
    ))
    .await
}

impl Db {
    /// Connect to a SQLite database, creating the file if it does not exist.
    ///
    /// In-memory databases are pinned to a single connection so every query
    /// sees the same schema.
    pub async fn connect(uri: &str) -> Result<Self, sqlx::Error> {
        info!("Connecting to SQLite database at URI: {}", uri);
        let options = SqliteConnectOptions::from_str(uri)?
            .create_if_missing(true)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new();
        if uri.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        info!("Connected to SQLite database: {}", uri);
        Ok(Db { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute an arbitrary SQL statement, e.g. DDL, INSERT, UPDATE.
    pub async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        debug!("Executing SQL: {}", sql);
        let result = self.pool.execute(sql).await;
        if let Err(e) = &result {
            log::error!("SQL execution failed: {}", e);
        }
        result.map(|_| ())
    }

    /// Fetch all rows and map to a type implementing `FromRow`.
    pub async fn fetch_all<T: for<'r> FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
    ) -> Result<Vec<T>, sqlx::Error> {
        debug!("Fetching rows with SQL: {}", sql);
        let result = sqlx::query_as(sql).fetch_all(&self.pool).await;
        match &result {
            Ok(rows) => debug!("Fetched {} rows", rows.len()),
            Err(e) => log::error!("Row fetch failed: {}", e),
        }
        result
    }
}

/// Run every migration registered through `inventory`.
pub async fn auto_migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
    info!("Starting auto migration of all registered models...");
    let mut total = 0;
    for m in inventory::iter::<Migration> {
        total += 1;
        if let Err(e) = (m.0)(db.clone()).await {
            log::error!("Auto-migration failed for a model: {}", e);
            return Err(e);
        }
    }
    info!("Auto migration completed for {} models.", total);
    Ok(())
}

/// Applies `*.sql` files found directly in `migrations_dir`, in filename order.
/// Files already recorded in the migrations table are skipped.
pub async fn apply_migration_files(db: Arc<Db>, migrations_dir: &str) -> Result<usize, sqlx::Error> {
    ensure_migrations_table(&db).await?;

    let mut files: Vec<_> = WalkDir::new(migrations_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|f| f.file_type().is_file())
        .filter(|f| f.path().extension().map(|e| e == "sql").unwrap_or(false))
        .collect();
    files.sort_by_key(|f| f.file_name().to_os_string());

    let mut applied_now = 0;
    for entry in files {
        let filename = entry.file_name().to_string_lossy().to_string();
        let applied: Vec<(String,)> = db
            .fetch_all(&format!(
                "SELECT filename FROM {} WHERE filename = '{}'",
                MIGRATIONS_TABLE,
                escape_sql_quote(&filename)
            ))
            .await?;
        if !applied.is_empty() {
            debug!("Migration `{}` already applied.", filename);
            continue;
        }

        let sql = tokio::fs::read_to_string(entry.path()).await?;
        info!("Applying migration file: {}", filename);
        db.execute(&sql).await?;
        db.execute(&format!(
            "INSERT INTO {} (filename) VALUES ('{}')",
            MIGRATIONS_TABLE,
            escape_sql_quote(&filename)
        ))
        .await?;
        applied_now += 1;
    }

    Ok(applied_now)
}
