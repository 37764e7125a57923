//! Handed to a running executor so it can report progress without knowing
//! anything about persistence, rate limiting, or the event bus.

use crate::event::{Event, EventBus};
use chrono::Utc;
use spaudit_domain::job::{JobState, Stage};
use spaudit_domain::EngineError;
use spaudit_ids::JobId;
use spaudit_repo::JobRepository;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Persisted writes are rate-limited to at most one per `MIN_INTERVAL`; the
/// in-memory `JobState` the caller builds up is always current, only the
/// write-through to storage is throttled.
const MIN_INTERVAL: Duration = Duration::from_millis(250);

struct Inner {
    job_id: JobId,
    site_url: String,
    repo: JobRepository,
    bus: EventBus,
    state: Mutex<JobState>,
    last_persisted: Mutex<Option<Instant>>,
}

#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

impl ProgressReporter {
    pub(crate) fn new(job_id: JobId, site_url: String, repo: JobRepository, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                job_id,
                site_url,
                repo,
                bus,
                state: Mutex::new(JobState::default()),
                last_persisted: Mutex::new(None),
            }),
        }
    }

    pub async fn update(
        &self,
        stage: Stage,
        description: impl Into<String>,
        items_done: u64,
        items_total: Option<u64>,
    ) -> Result<(), EngineError> {
        let mut state = self.inner.state.lock().await;
        state.update_progress(Utc::now(), stage, description.into(), items_done, items_total);
        self.persist_if_due(&state).await
    }

    pub async fn note(&self, message: impl Into<String>) -> Result<(), EngineError> {
        let mut state = self.inner.state.lock().await;
        state.note(message.into());
        self.persist_if_due(&state).await
    }

    /// Always persists and publishes regardless of the rate limit — used at
    /// stage boundaries and job completion where a stale view is worse than
    /// an extra write.
    pub async fn flush(&self) -> Result<(), EngineError> {
        let state = self.inner.state.lock().await;
        self.persist(&state).await
    }

    pub async fn snapshot(&self) -> JobState {
        self.inner.state.lock().await.clone()
    }

    async fn persist_if_due(&self, state: &JobState) -> Result<(), EngineError> {
        let mut last = self.inner.last_persisted.lock().await;
        let due = last.map(|t| t.elapsed() >= MIN_INTERVAL).unwrap_or(true);
        if !due {
            return Ok(());
        }
        *last = Some(Instant::now());
        drop(last);
        self.persist(state).await
    }

    async fn persist(&self, state: &JobState) -> Result<(), EngineError> {
        let mut job = self.inner.repo.get(&self.inner.job_id).await?;
        job.state = state.clone();
        self.inner.repo.save(&job).await?;
        self.inner
            .bus
            .publish(Event::JobProgress {
                job_id: self.inner.job_id.clone(),
                state: state.clone(),
            })
            .await;
        Ok(())
    }

    pub fn job_id(&self) -> &JobId {
        &self.inner.job_id
    }

    pub fn site_url(&self) -> &str {
        &self.inner.site_url
    }
}
