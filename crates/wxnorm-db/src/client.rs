//! Database client and connection management

use crate::schema::CREATE_TABLES;
use crate::{DbError, DbResult};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::info;

/// Database client wrapping sqlx connection pool
#[derive(Clone)]
pub struct DbClient {
    pool: MySqlPool,
}

impl DbClient {
    /// Create a new database client from connection string
    pub async fn new(database_url: &str) -> DbResult<Self> {
        if database_url.trim().is_empty() {
            return Err(DbError::ConfigError("database url is empty".to_string()));
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Get reference to underlying pool for direct queries
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Create missing tables
    pub async fn ensure_schema(&self) -> DbResult<()> {
        for ddl in CREATE_TABLES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        info!(tables = CREATE_TABLES.len(), "Schema ready");
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let err = DbClient::new("  ").await.err().unwrap();
        assert!(matches!(err, DbError::ConfigError(_)));
    }
}
