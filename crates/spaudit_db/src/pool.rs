//! Pool construction: a many-reader pool and a single-connection writer,
//! both backed by the same SQLite file, tuned per `DB_*` environment knobs.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

static MEM_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

/// Pool sizing and pragma configuration, one knob per `DB_*` environment
/// variable in the external-interfaces table.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
    pub busy_timeout: Duration,
    pub enable_foreign_keys: bool,
    pub enable_wal: bool,
}

impl DbConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn sqlite_memory() -> Self {
        Self::sqlite(":memory:")
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: "./spaudit.db".to_string(),
            max_open_conns: 10,
            max_idle_conns: 5,
            conn_max_lifetime: Duration::from_secs(3600),
            conn_max_idle_time: Duration::from_secs(600),
            busy_timeout: Duration::from_millis(5000),
            enable_foreign_keys: true,
            enable_wal: true,
        }
    }
}

/// Both logical handles over the same database file: a reader pool and a
/// single-connection writer. Readers never block writers and vice versa
/// because they hold independent connections under WAL journaling.
#[derive(Debug, Clone)]
pub struct DbHandles {
    pub read_pool: SqlitePool,
    pub write_pool: SqlitePool,
}

fn connect_options(config: &DbConfig) -> Result<SqliteConnectOptions, DbError> {
    let mut opts = if config.path == ":memory:" {
        // A plain ":memory:" gives every pooled connection its own database;
        // use a named shared-cache db so the read pool and write pool (and
        // every connection within the read pool) see the same data.
        let name = MEM_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        SqliteConnectOptions::from_str(&format!(
            "sqlite:file:spaudit-mem-{name}?mode=memory&cache=shared"
        ))
        .map_err(|e| DbError::InvalidUrl(e.to_string()))?
    } else {
        SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))
            .map_err(|e| DbError::InvalidUrl(e.to_string()))?
            .create_if_missing(true)
    };

    opts = opts
        .foreign_keys(config.enable_foreign_keys)
        .busy_timeout(config.busy_timeout);

    if config.enable_wal {
        opts = opts.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
    }

    Ok(opts.synchronous(sqlx::sqlite::SqliteSynchronous::Normal))
}

/// Open the read pool and write pool. Open/ping failures here are fatal at
/// startup per the storage component's failure semantics.
pub async fn create_handles(config: &DbConfig) -> Result<DbHandles, DbError> {
    let opts = connect_options(config)?;
    let is_memory = config.path == ":memory:";

    let mut read_pool_opts = SqlitePoolOptions::new()
        .max_connections(config.max_open_conns.max(1))
        .max_lifetime(config.conn_max_lifetime)
        .idle_timeout(config.conn_max_idle_time);
    read_pool_opts = if is_memory {
        // Keep at least one connection open so the named shared-cache
        // database isn't dropped between checkouts.
        read_pool_opts.min_connections(1)
    } else {
        read_pool_opts.min_connections(config.max_idle_conns.min(config.max_open_conns))
    };
    let read_pool = read_pool_opts.connect_with(opts.clone()).await?;

    // Single serialized writer: exactly one connection, so every write
    // transaction is naturally queued behind the last.
    let write_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .connect_with(opts)
        .await?;

    sqlx::query("SELECT 1").execute(&read_pool).await?;
    sqlx::query("SELECT 1").execute(&write_pool).await?;

    Ok(DbHandles {
        read_pool,
        write_pool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_handles() {
        let config = DbConfig::sqlite_memory();
        let handles = create_handles(&config).await.unwrap();
        sqlx::query("SELECT 1")
            .execute(&handles.read_pool)
            .await
            .unwrap();
        sqlx::query("SELECT 1")
            .execute(&handles.write_pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn write_pool_has_exactly_one_connection() {
        let handles = create_handles(&DbConfig::sqlite_memory()).await.unwrap();
        assert_eq!(handles.write_pool.size(), 1);
    }
}
