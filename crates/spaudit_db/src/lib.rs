//! Embedded storage layer: a read pool, a single-writer handle, versioned
//! migrations, and transaction helpers over `sqlx::SqlitePool`.

pub mod health;
pub mod migrate;
pub mod pool;
pub mod tx;

pub use health::{HealthReport, PoolStats};
pub use migrate::MigrateError;
pub use pool::{DbConfig, DbError, DbHandles};
pub use tx::{with_read_tx, with_write_tx};

/// Opens the database and applies any pending migrations. Both failure
/// modes are fatal at startup, per the storage component's contract.
pub async fn open(config: &DbConfig) -> Result<DbHandles, OpenError> {
    let handles = pool::create_handles(config).await?;
    migrate::run_migrations(&handles.write_pool).await?;
    Ok(handles)
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Pool(#[from] DbError),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_applies_schema() {
        let handles = open(&DbConfig::sqlite_memory()).await.unwrap();
        sqlx::query("SELECT COUNT(*) FROM audit_runs")
            .execute(&handles.read_pool)
            .await
            .unwrap();
    }
}
