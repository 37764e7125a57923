//! C5: job registry and lifecycle service. One registry per process; holds
//! the in-memory handles (cancellation token, executor future) for active
//! jobs alongside the durable `jobs` table a restart can recover from.

use crate::cancel::CancellationToken;
use crate::event::{Event, EventBus};
use crate::executor::JobExecutor;
use crate::progress::ProgressReporter;
use chrono::Utc;
use spaudit_db::{with_write_tx, DbHandles};
use spaudit_domain::job::{Job, JobStatus};
use spaudit_domain::{EngineError, JobParams};
use spaudit_ids::JobId;
use spaudit_repo::JobRepository;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

struct ActiveHandle {
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct JobRegistry {
    db: DbHandles,
    repo: JobRepository,
    bus: EventBus,
    executors: Arc<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>,
    active: Arc<RwLock<HashMap<JobId, ActiveHandle>>>,
}

impl JobRegistry {
    pub fn new(db: DbHandles, bus: EventBus) -> Self {
        Self {
            repo: JobRepository::new(db.clone()),
            db,
            bus,
            executors: Arc::new(RwLock::new(HashMap::new())),
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn register_executor(&self, job_type: impl Into<String>, executor: Arc<dyn JobExecutor>) {
        self.executors.write().await.insert(job_type.into(), executor);
    }

    /// Admission control: at most one active (`pending`/`running`) job per
    /// `site_url`. The cheap pre-check in `JobRepository::find_active_by_site_url`
    /// catches the common case; the authoritative check happens inside this
    /// write transaction so two concurrent `start_job` calls can't both pass.
    pub async fn start_job(&self, job_type: &str, site_url: &str, params: JobParams) -> Result<JobId, EngineError> {
        let executor = {
            let executors = self.executors.read().await;
            executors
                .get(job_type)
                .cloned()
                .ok_or_else(|| EngineError::ValidationError(format!("no executor registered for job type {job_type}")))?
        };

        let job = Job::new(job_type, site_url);
        let job_id = job.job_id.clone();
        let job_id_str = job_id.as_str().to_string();
        let job_type_owned = job_type.to_string();
        let site_url_owned = site_url.to_string();
        let state_json = job.state.to_json();

        let site_url_for_tx = site_url_owned.clone();
        with_write_tx::<_, EngineError, _>(&self.db.write_pool, move |tx| {
            Box::pin(async move {
                let existing = sqlx::query(
                    "SELECT job_id FROM jobs WHERE site_url = ? AND status IN ('pending', 'running') LIMIT 1",
                )
                .bind(&site_url_for_tx)
                .fetch_optional(&mut **tx)
                .await?;

                if let Some(row) = existing {
                    let existing_job_id: String = row.try_get("job_id")?;
                    return Err(EngineError::AlreadyActive { existing_job_id });
                }

                sqlx::query(
                    "INSERT INTO jobs (job_id, job_type, status, site_url, progress, state_json) \
                     VALUES (?, ?, 'pending', ?, 0.0, ?)",
                )
                .bind(&job_id_str)
                .bind(&job_type_owned)
                .bind(&site_url_for_tx)
                .bind(&state_json)
                .execute(&mut **tx)
                .await?;
                Ok(())
            })
        })
        .await?;

        self.bus.publish(Event::JobCreated { job_id: job_id.clone() }).await;
        self.spawn(job_id.clone(), site_url_owned, params, executor);
        Ok(job_id)
    }

    fn spawn(&self, job_id: JobId, site_url: String, params: JobParams, executor: Arc<dyn JobExecutor>) {
        let cancel = CancellationToken::new();
        let registry = self.clone();
        let handle = ActiveHandle { cancel: cancel.clone() };

        let active = self.active.clone();
        let job_id_for_task = job_id.clone();
        tokio::spawn(async move {
            active.write().await.insert(job_id_for_task.clone(), handle);
            registry.run_job(job_id_for_task.clone(), site_url, params, cancel, executor).await;
            active.write().await.remove(&job_id_for_task);
        });
    }

    async fn run_job(&self, job_id: JobId, site_url: String, params: JobParams, cancel: CancellationToken, executor: Arc<dyn JobExecutor>) {
        if let Err(err) = self.mark_running(&job_id).await {
            error!(%job_id, %err, "failed to mark job running");
            return;
        }

        let progress = ProgressReporter::new(job_id.clone(), site_url.clone(), self.repo.clone(), self.bus.clone());
        let outcome = executor.run(site_url, params, cancel.clone(), progress.clone()).await;

        if let Err(err) = progress.flush().await {
            warn!(%job_id, %err, "failed to flush final progress");
        }

        match outcome {
            Ok(result) => {
                if let Err(err) = self.mark_completed(&job_id, result).await {
                    error!(%job_id, %err, "failed to persist job completion");
                }
                self.bus.publish(Event::JobCompleted { job_id: job_id.clone() }).await;
            }
            Err(EngineError::Cancelled) => {
                if let Err(err) = self.mark_cancelled(&job_id).await {
                    error!(%job_id, %err, "failed to persist job cancellation");
                }
                self.bus.publish(Event::JobCancelled { job_id: job_id.clone() }).await;
            }
            Err(other) => {
                let message = other.to_string();
                if let Err(err) = self.mark_failed(&job_id, &message).await {
                    error!(%job_id, %err, "failed to persist job failure");
                }
                self.bus
                    .publish(Event::JobFailed { job_id: job_id.clone(), error: message })
                    .await;
            }
        }
        info!(%job_id, "job finished");
    }

    async fn mark_running(&self, job_id: &JobId) -> Result<(), EngineError> {
        let mut job = self.repo.get(job_id).await?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.repo.save(&job).await
    }

    async fn mark_completed(&self, job_id: &JobId, result: serde_json::Value) -> Result<(), EngineError> {
        let mut job = self.repo.get(job_id).await?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = Some(result);
        self.repo.save(&job).await
    }

    async fn mark_failed(&self, job_id: &JobId, error: &str) -> Result<(), EngineError> {
        let mut job = self.repo.get(job_id).await?;
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error = Some(error.to_string());
        self.repo.save(&job).await
    }

    async fn mark_cancelled(&self, job_id: &JobId) -> Result<(), EngineError> {
        let mut job = self.repo.get(job_id).await?;
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.repo.save(&job).await
    }

    /// Requests cancellation of a running job. Distinguishes a job id that
    /// never existed (`NotFound`) from one that exists but has already
    /// reached a terminal status, or was running in a process that has
    /// since restarted (`NotActive`) — callers need to tell those apart.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<(), EngineError> {
        if let Some(handle) = self.active.read().await.get(job_id) {
            handle.cancel.cancel();
            return Ok(());
        }
        let job = self.repo.get(job_id).await?;
        Err(EngineError::NotActive { job_id: job.job_id.as_str().to_string() })
    }

    pub async fn get_job(&self, job_id: &JobId) -> Result<Job, EngineError> {
        self.repo.get(job_id).await
    }

    pub async fn list_all_jobs(&self) -> Result<Vec<Job>, EngineError> {
        self.repo.list_all().await
    }

    pub async fn list_jobs_by_type(&self, job_type: &str) -> Result<Vec<Job>, EngineError> {
        self.repo.list_by_type(job_type).await
    }

    pub async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, EngineError> {
        self.repo.list_by_status(status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use spaudit_db::{open, DbConfig};

    struct Instant;

    #[async_trait]
    impl JobExecutor for Instant {
        async fn run(
            &self,
            _site_url: String,
            _params: JobParams,
            _cancel: CancellationToken,
            _progress: ProgressReporter,
        ) -> Result<serde_json::Value, EngineError> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    struct Blocker;

    #[async_trait]
    impl JobExecutor for Blocker {
        async fn run(
            &self,
            _site_url: String,
            _params: JobParams,
            cancel: CancellationToken,
            _progress: ProgressReporter,
        ) -> Result<serde_json::Value, EngineError> {
            cancel.cancelled().await;
            Err(EngineError::Cancelled)
        }
    }

    async fn registry() -> JobRegistry {
        let db = open(&DbConfig::sqlite_memory()).await.unwrap();
        JobRegistry::new(db, EventBus::new())
    }

    #[tokio::test]
    async fn start_job_runs_to_completion() {
        let reg = registry().await;
        reg.register_executor("noop", Arc::new(Instant)).await;
        let job_id = reg.start_job("noop", "https://t/s/A", JobParams::default()).await.unwrap();

        for _ in 0..50 {
            let job = reg.get_job(&job_id).await.unwrap();
            if job.status == JobStatus::Completed {
                assert_eq!(job.result.unwrap()["ok"], true);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job did not complete in time");
    }

    #[tokio::test]
    async fn admission_control_rejects_second_active_job_for_same_site() {
        let reg = registry().await;
        reg.register_executor("blocker", Arc::new(Blocker)).await;
        reg.start_job("blocker", "https://t/s/A", JobParams::default()).await.unwrap();

        let err = reg.start_job("blocker", "https://t/s/A", JobParams::default()).await.unwrap_err();
        assert_eq!(err.kind(), spaudit_domain::ErrorKind::AlreadyActive);
    }

    #[tokio::test]
    async fn cancel_job_stops_a_running_executor() {
        let reg = registry().await;
        reg.register_executor("blocker", Arc::new(Blocker)).await;
        let job_id = reg.start_job("blocker", "https://t/s/A", JobParams::default()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        reg.cancel_job(&job_id).await.unwrap();

        for _ in 0..50 {
            let job = reg.get_job(&job_id).await.unwrap();
            if job.status == JobStatus::Cancelled {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job did not cancel in time");
    }

    #[tokio::test]
    async fn cancel_job_distinguishes_not_found_from_not_active() {
        let reg = registry().await;
        reg.register_executor("noop", Arc::new(Instant)).await;

        let unknown = spaudit_ids::JobId::new();
        let err = reg.cancel_job(&unknown).await.unwrap_err();
        assert_eq!(err.kind(), spaudit_domain::ErrorKind::NotFound);

        let job_id = reg.start_job("noop", "https://t/s/A", JobParams::default()).await.unwrap();
        for _ in 0..50 {
            let job = reg.get_job(&job_id).await.unwrap();
            if job.status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let err = reg.cancel_job(&job_id).await.unwrap_err();
        assert_eq!(err.kind(), spaudit_domain::ErrorKind::NotActive);
    }
}
