//! Tier 1: the global (not run-scoped) site repository.

use chrono::Utc;
use spaudit_db::DbHandles;
use spaudit_domain::{EngineError, Site};
use spaudit_ids::SiteId;
use sqlx::Row;

#[derive(Clone)]
pub struct SiteRepository {
    db: DbHandles,
}

impl SiteRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    /// Upserts by URL. Repeated calls with the same URL return the same
    /// `site_id` and update only `title`.
    pub async fn upsert_site(&self, url: &str, title: &str) -> Result<SiteId, EngineError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO sites (url, title, created_at, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(url) DO UPDATE SET title = excluded.title, updated_at = excluded.updated_at",
        )
        .bind(url)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.db.write_pool)
        .await?;

        let row = sqlx::query("SELECT site_id FROM sites WHERE url = ?")
            .bind(url)
            .fetch_one(&self.db.write_pool)
            .await?;
        Ok(SiteId::new(row.try_get::<i64, _>("site_id")?))
    }

    pub async fn get_site(&self, site_id: SiteId) -> Result<Site, EngineError> {
        let row = sqlx::query("SELECT * FROM sites WHERE site_id = ?")
            .bind(site_id.get())
            .fetch_optional(&self.db.read_pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("site {site_id}")))?;
        row_to_site(&row)
    }

    pub async fn find_site_by_url(&self, url: &str) -> Result<Option<Site>, EngineError> {
        let row = sqlx::query("SELECT * FROM sites WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.db.read_pool)
            .await?;
        row.as_ref().map(row_to_site).transpose()
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, EngineError> {
        let rows = sqlx::query("SELECT * FROM sites ORDER BY site_id ASC")
            .fetch_all(&self.db.read_pool)
            .await?;
        rows.iter().map(row_to_site).collect()
    }

    pub async fn search_sites(&self, query: &str) -> Result<Vec<Site>, EngineError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT * FROM sites WHERE url LIKE ? OR title LIKE ? ORDER BY site_id ASC",
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.db.read_pool)
        .await?;
        rows.iter().map(row_to_site).collect()
    }
}

fn row_to_site(row: &sqlx::sqlite::SqliteRow) -> Result<Site, EngineError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Site {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EngineError::Fatal(e.to_string()))?,
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EngineError::Fatal(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaudit_db::{open, DbConfig};

    #[tokio::test]
    async fn upsert_is_idempotent_on_url_and_updates_title() {
        let db = open(&DbConfig::sqlite_memory()).await.unwrap();
        let repo = SiteRepository::new(db);

        let id1 = repo.upsert_site("https://t/s/A", "First").await.unwrap();
        let id2 = repo.upsert_site("https://t/s/A", "Second").await.unwrap();
        assert_eq!(id1, id2);

        let site = repo.get_site(id1).await.unwrap();
        assert_eq!(site.title, "Second");
    }
}
