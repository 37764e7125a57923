//! C8: client fan-out for push notifications. Transport-agnostic — a
//! `SseSink` is whatever the caller's HTTP layer wires to an actual
//! Server-Sent Events response writer; this crate only tracks clients and
//! decides what to broadcast and when to evict.

use async_trait::async_trait;
use serde::Serialize;
use spaudit_ids::JobId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    JobListUpdate,
    JobUpdate { job_id: JobId },
    SitesUpdate,
    Toast { message: String, level: ToastLevel },
    RichJobToast { job_id: JobId, message: String, level: ToastLevel },
    Keepalive,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// A live SSE connection. Implementations write one SSE frame per call and
/// report write failures so the client can be evicted instead of silently
/// leaking a dead connection.
#[async_trait]
pub trait SseSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
#[error("sink write failed: {0}")]
pub struct SinkError(pub String);

struct Client {
    sink: Arc<dyn SseSink>,
    last_sent: Instant,
}

#[derive(Clone, Default)]
pub struct NotificationHub {
    clients: Arc<RwLock<HashMap<ClientId, Client>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_client(&self, sink: Arc<dyn SseSink>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        self.clients.write().await.insert(
            id,
            Client { sink, last_sent: Instant::now() },
        );
        id
    }

    /// Idempotent: removing an already-absent client is not an error.
    pub async fn remove_client(&self, id: ClientId) {
        self.clients.write().await.remove(&id);
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn broadcast_job_list_update(&self) {
        self.broadcast(Notification::JobListUpdate).await;
    }

    pub async fn broadcast_job_update(&self, job_id: JobId) {
        self.broadcast(Notification::JobUpdate { job_id }).await;
    }

    pub async fn broadcast_sites_update(&self) {
        self.broadcast(Notification::SitesUpdate).await;
    }

    pub async fn broadcast_toast(&self, message: impl Into<String>, level: ToastLevel) {
        self.broadcast(Notification::Toast { message: message.into(), level }).await;
    }

    pub async fn broadcast_rich_job_toast(&self, job_id: JobId, message: impl Into<String>, level: ToastLevel) {
        self.broadcast(Notification::RichJobToast { job_id, message: message.into(), level }).await;
    }

    pub async fn close_all(&self) {
        self.clients.write().await.clear();
    }

    async fn broadcast(&self, notification: Notification) {
        let failed = {
            let mut clients = self.clients.write().await;
            let mut failed = Vec::new();
            for (id, client) in clients.iter_mut() {
                match client.sink.send(&notification).await {
                    Ok(()) => client.last_sent = Instant::now(),
                    Err(err) => {
                        warn!(?id, %err, "dropping client after failed write");
                        failed.push(*id);
                    }
                }
            }
            failed
        };
        if !failed.is_empty() {
            let mut clients = self.clients.write().await;
            for id in failed {
                clients.remove(&id);
            }
        }
    }

    /// Sends a keepalive to every client and evicts any whose last
    /// successful send exceeds `CLIENT_IDLE_TIMEOUT`. Intended to be driven
    /// by a background loop on `KEEPALIVE_INTERVAL`.
    pub async fn reap(&self) {
        self.broadcast(Notification::Keepalive).await;
        let stale: Vec<ClientId> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(_, c)| c.last_sent.elapsed() > CLIENT_IDLE_TIMEOUT)
                .map(|(id, _)| *id)
                .collect()
        };
        if stale.is_empty() {
            return;
        }
        let mut clients = self.clients.write().await;
        for id in stale {
            debug!(?id, "evicting idle client");
            clients.remove(&id);
        }
    }

    /// Spawns the background keepalive/reap loop. Returns a handle the
    /// caller can abort on shutdown.
    pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
            loop {
                interval.tick().await;
                hub.reap().await;
            }
        })
    }
}
