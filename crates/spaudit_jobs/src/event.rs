//! C7: the progress/event bus. Fixed event set, per-type handler
//! registration, best-effort fire-and-forget delivery. A panicking handler
//! is caught and logged — it must never take down the publisher or other
//! handlers.

use futures::FutureExt;
use spaudit_domain::job::JobState;
use spaudit_ids::JobId;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum Event {
    JobCreated { job_id: JobId },
    JobProgress { job_id: JobId, state: JobState },
    JobCompleted { job_id: JobId },
    JobFailed { job_id: JobId, error: String },
    JobCancelled { job_id: JobId },
    SitesChanged,
}

impl Event {
    fn kind(&self) -> EventKind {
        match self {
            Event::JobCreated { .. } => EventKind::JobCreated,
            Event::JobProgress { .. } => EventKind::JobProgress,
            Event::JobCompleted { .. } => EventKind::JobCompleted,
            Event::JobFailed { .. } => EventKind::JobFailed,
            Event::JobCancelled { .. } => EventKind::JobCancelled,
            Event::SitesChanged => EventKind::SitesChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EventKind {
    JobCreated,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCancelled,
    SitesChanged,
}

const ALL_KINDS: [EventKind; 6] = [
    EventKind::JobCreated,
    EventKind::JobProgress,
    EventKind::JobCompleted,
    EventKind::JobFailed,
    EventKind::JobCancelled,
    EventKind::SitesChanged,
];

pub type Handler = Arc<dyn Fn(Event) + Send + Sync>;

/// Handlers run detached (`tokio::spawn`), so publish never blocks on a slow
/// subscriber and ordering is only guaranteed per-publisher, not globally.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<(EventKind, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, kind_filter: Option<&[EventKindPub]>, handler: Handler) {
        let kinds: Vec<EventKind> = match kind_filter {
            Some(kinds) => kinds.iter().map(|k| k.0).collect(),
            None => ALL_KINDS.to_vec(),
        };
        let mut handlers = self.handlers.write().await;
        for kind in kinds {
            handlers.push((kind, handler.clone()));
        }
    }

    pub async fn publish(&self, event: Event) {
        let kind = event.kind();
        let handlers = self.handlers.read().await;
        for (handler_kind, handler) in handlers.iter() {
            if *handler_kind != kind {
                continue;
            }
            let handler = handler.clone();
            let event = event.clone();
            tokio::spawn(async move {
                let result = AssertUnwindSafe(async { handler(event) }).catch_unwind().await;
                if let Err(panic) = result {
                    warn!(?panic, "event handler panicked");
                }
            });
        }
    }
}

/// Public handle for an `EventKind` filter, since the enum itself stays
/// private to the module.
#[derive(Debug, Clone, Copy)]
pub struct EventKindPub(EventKind);

impl EventKindPub {
    pub const JOB_CREATED: Self = Self(EventKind::JobCreated);
    pub const JOB_PROGRESS: Self = Self(EventKind::JobProgress);
    pub const JOB_COMPLETED: Self = Self(EventKind::JobCompleted);
    pub const JOB_FAILED: Self = Self(EventKind::JobFailed);
    pub const JOB_CANCELLED: Self = Self(EventKind::JobCancelled);
    pub const SITES_CHANGED: Self = Self(EventKind::SitesChanged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn handler_receives_only_subscribed_kind() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        bus.subscribe(
            Some(&[EventKindPub::JOB_COMPLETED]),
            Arc::new(move |_event| {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

        bus.publish(Event::JobCreated { job_id: JobId::new() }).await;
        bus.publish(Event::JobCompleted { job_id: JobId::new() }).await;

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_other_handlers() {
        let bus = EventBus::new();
        bus.subscribe(None, Arc::new(|_event| panic!("boom"))).await;
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        bus.subscribe(
            None,
            Arc::new(move |_event| {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

        bus.publish(Event::SitesChanged).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
