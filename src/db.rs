// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
    Sqlite,
};

pub async fn create_db_pool(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    // An in-memory database lives as long as its one connection
    if is_memory(db_url) {
        return SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(db_url)
            .await;
    }

    // Create database if it doesn't exist
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        tracing::info!(db_url, "creating staging database");
        Sqlite::create_database(db_url).await?;
    }

    SqlitePool::connect(db_url).await
}

fn is_memory(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

#[cfg(test)]
pub async fn create_test_pool() -> Result<SqlitePool, sqlx::Error> {
    create_db_pool("sqlite::memory:").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_creates_database_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("staging.db");
        let db_url = format!("sqlite://{}", path.display());

        let pool = create_db_pool(&db_url).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        pool.close().await;

        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_state() -> anyhow::Result<()> {
        let pool = create_test_pool().await?;
        sqlx::query("CREATE TABLE t (x INTEGER)").execute(&pool).await?;
        sqlx::query("INSERT INTO t VALUES (1)").execute(&pool).await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM t").fetch_one(&pool).await?;
        assert_eq!(count, 1);
        Ok(())
    }
}
