//! Versioned schema migrations.
//!
//! Each migration is a `.sql` file embedded at compile time and identified
//! by a lexicographically-sortable version prefix (`0001`, `0002`, ...).
//! Applied versions are recorded in `schema_migrations`; already-applied
//! versions are skipped. A migration failure aborts startup.

use sqlx::{Row, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("migration {version} ({name}) failed: {source}")]
    Apply {
        version: &'static str,
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: "0001",
    name: "initial",
    sql: include_str!("../migrations/0001_initial.sql"),
}];

/// Apply all migrations not yet recorded in `schema_migrations`, in
/// ascending version order, each inside its own write transaction.
pub async fn run_migrations(write_pool: &SqlitePool) -> Result<(), MigrateError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(write_pool)
    .await?;

    let mut sorted: Vec<&Migration> = MIGRATIONS.iter().collect();
    sorted.sort_by_key(|m| m.version);

    for migration in sorted {
        let already_applied: Option<String> =
            sqlx::query("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(write_pool)
                .await?
                .map(|row| row.get::<String, _>("version"));

        if already_applied.is_some() {
            tracing::debug!(version = migration.version, "migration already applied");
            continue;
        }

        tracing::info!(version = migration.version, name = migration.name, "applying migration");
        let mut tx = write_pool.begin().await?;

        for statement in split_statements(migration.sql) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrateError::Apply {
                    version: migration.version,
                    name: migration.name,
                    source,
                })?;
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, datetime('now'))",
        )
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await
        .map_err(|source| MigrateError::Apply {
            version: migration.version,
            name: migration.name,
            source,
        })?;

        tx.commit().await?;
    }

    Ok(())
}

/// Splits a migration file into individual statements on `;` at end of
/// line. Migration SQL in this crate never embeds a `;` inside a string
/// literal, so a naive split is sufficient.
fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !stmt.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_handles, DbConfig};

    #[tokio::test]
    async fn applies_migrations_and_is_idempotent() {
        let handles = create_handles(&DbConfig::sqlite_memory()).await.unwrap();
        run_migrations(&handles.write_pool).await.unwrap();
        // Re-running must skip already-applied versions without error.
        run_migrations(&handles.write_pool).await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM schema_migrations")
            .fetch_one(&handles.write_pool)
            .await
            .unwrap()
            .get("c");
        assert_eq!(count, 1);

        // Sanity: the tables the migration creates are queryable.
        sqlx::query("SELECT COUNT(*) FROM sites")
            .fetch_one(&handles.write_pool)
            .await
            .unwrap();
        sqlx::query("SELECT COUNT(*) FROM jobs")
            .fetch_one(&handles.write_pool)
            .await
            .unwrap();
    }
}
