//! Transaction helpers. `with_write_tx` runs a closure against the single
//! writer handle; `with_read_tx` runs one against the reader pool. Kept as
//! two distinct functions (not one parameterized by access mode) so callers
//! can't accidentally issue a write through the read path.

use futures::future::BoxFuture;
use sqlx::{Sqlite, SqlitePool, Transaction};

pub async fn with_write_tx<T, E, F>(pool: &SqlitePool, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut Transaction<'_, Sqlite>) -> BoxFuture<'c, Result<T, E>>,
    E: From<sqlx::Error>,
{
    run_in_tx(pool, f).await
}

pub async fn with_read_tx<T, E, F>(pool: &SqlitePool, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut Transaction<'_, Sqlite>) -> BoxFuture<'c, Result<T, E>>,
    E: From<sqlx::Error>,
{
    run_in_tx(pool, f).await
}

async fn run_in_tx<T, E, F>(pool: &SqlitePool, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut Transaction<'_, Sqlite>) -> BoxFuture<'c, Result<T, E>>,
    E: From<sqlx::Error>,
{
    let mut tx = pool.begin().await.map_err(E::from)?;
    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await.map_err(E::from)?;
            Ok(value)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}
