//! Pool statistics for the `/health` endpoint (owned by the out-of-scope
//! HTTP layer; this module only computes the numbers).

use crate::pool::DbHandles;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub read_pool: PoolStats,
    pub write_pool: PoolStats,
    pub ok: bool,
}

impl DbHandles {
    /// Pings both handles and reports pool stats. A ping failure is
    /// reflected in `ok: false`, never propagated as an error, so the
    /// caller can always render a response.
    pub async fn health(&self) -> HealthReport {
        let read_ok = sqlx::query("SELECT 1").execute(&self.read_pool).await.is_ok();
        let write_ok = sqlx::query("SELECT 1").execute(&self.write_pool).await.is_ok();

        HealthReport {
            read_pool: PoolStats {
                size: self.read_pool.size(),
                idle: self.read_pool.num_idle(),
            },
            write_pool: PoolStats {
                size: self.write_pool.size(),
                idle: self.write_pool.num_idle(),
            },
            ok: read_ok && write_ok,
        }
    }
}
