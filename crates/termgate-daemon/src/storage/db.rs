//! SQLite database for the termgate daemon.

use std::path::Path;

use sqlx::{Pool, Sqlite};
use tracing::info;

use termgate_core::db::{DatabaseError, open_pool, open_pool_in_memory};

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let db = Self {
            pool: open_pool(path).await?,
        };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = Self {
            pool: open_pool_in_memory().await?,
        };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        info!("Database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("termgate.db");

        let db = Database::open(&path).await.unwrap();
        assert!(path.exists());

        // Reopening runs migrations idempotently.
        drop(db);
        Database::open(&path).await.unwrap();
    }
}
