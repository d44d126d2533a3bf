use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Broad suffix search over the full path of every indexed file.
///
/// SQLite can only serve this as a scan, since the pattern starts with a
/// wildcard. `LIKE` is also case-insensitive for ASCII and treats `_` and `%`
/// in the fragment as wildcards, so callers must verify the exact suffix
/// themselves.
pub const LOOKUP_QUERY: &str =
    "SELECT path || '/' || file FROM files WHERE path || '/' || file LIKE ?";

#[derive(Error, Debug)]
pub enum PathIndexError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only lookup of known on-disk file locations (allows mocking for tests)
#[async_trait]
pub trait PathIndex: Send + Sync {
    /// Full paths matching `'%' || fragment`, in storage order
    async fn candidates(&self, fragment: &str) -> Result<Vec<String>, PathIndexError>;
}

/// Path index backed by a SQLite `files(path, file)` table
#[derive(Debug, Clone)]
pub struct SqlitePathIndex {
    pool: SqlitePool,
}

impl SqlitePathIndex {
    /// Open an existing database read-only.
    ///
    /// `timeout` bounds both waiting on a locked database and acquiring a
    /// connection from the pool.
    pub async fn open(database_path: &Path, timeout: Duration) -> Result<Self, PathIndexError> {
        info!("Opening path database {}", database_path.display());
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .read_only(true)
            .busy_timeout(timeout);

        // Only the resolver task queries, one statement at a time
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PathIndex for SqlitePathIndex {
    async fn candidates(&self, fragment: &str) -> Result<Vec<String>, PathIndexError> {
        let rows: Vec<Option<String>> = sqlx::query_scalar(LOOKUP_QUERY)
            .bind(format!("%{}", fragment))
            .fetch_all(&self.pool)
            .await?;

        // Rows with a NULL path or file concatenate to NULL
        Ok(rows.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_database(dir: &TempDir, rows: &[(&str, &str)]) -> std::path::PathBuf {
        let db_path = dir.path().join("files.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .expect("Failed to create database");

        sqlx::query("CREATE TABLE files (path TEXT, file TEXT)")
            .execute(&pool)
            .await
            .expect("Failed to create table");
        for (path, file) in rows {
            sqlx::query("INSERT INTO files (path, file) VALUES (?, ?)")
                .bind(path)
                .bind(file)
                .execute(&pool)
                .await
                .expect("Failed to insert row");
        }
        pool.close().await;
        db_path
    }

    #[tokio::test]
    async fn test_candidates_end_with_fragment() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = create_database(
            &dir,
            &[
                ("/data/incoming/iso", "ubuntu-22.04.iso"),
                ("/data/archive/old-iso", "ubuntu-22.04.iso"),
                ("/data/incoming/iso", "debian-12.iso"),
            ],
        )
        .await;

        let index = SqlitePathIndex::open(&db_path, Duration::from_secs(5))
            .await
            .expect("Failed to open index");
        let candidates = index
            .candidates("iso/ubuntu-22.04.iso")
            .await
            .expect("Query failed");

        assert_eq!(candidates.len(), 2);
        assert!(candidates.contains(&"/data/incoming/iso/ubuntu-22.04.iso".to_string()));
        assert!(candidates.contains(&"/data/archive/old-iso/ubuntu-22.04.iso".to_string()));
    }

    #[tokio::test]
    async fn test_candidates_skip_null_rows() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = create_database(&dir, &[("/data", "a.bin")]).await;

        let url = format!("sqlite://{}", db_path.display());
        let pool = SqlitePool::connect(&url).await.expect("Failed to connect");
        sqlx::query("INSERT INTO files (path, file) VALUES (NULL, 'a.bin')")
            .execute(&pool)
            .await
            .expect("Failed to insert row");

        let index = SqlitePathIndex::from_pool(pool);
        let candidates = index.candidates("a.bin").await.expect("Query failed");
        assert_eq!(candidates, vec!["/data/a.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_open_missing_database_fails() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result =
            SqlitePathIndex::open(&dir.path().join("missing.db"), Duration::from_secs(1)).await;
        assert!(result.is_err(), "Read-only open must not create a database");
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("empty.db").display());
        let pool = SqlitePool::connect(&url).await.expect("Failed to connect");

        let index = SqlitePathIndex::from_pool(pool);
        let result = index.candidates("anything").await;
        assert!(matches!(result, Err(PathIndexError::Database(_))));
    }
}
