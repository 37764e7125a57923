//! Audit execution and history engine.
//!
//! Wires the job registry, event bus, SSE notification hub, and scoped
//! read-service factory over a single embedded database. This binary does
//! not bind an HTTP listener or implement a SharePoint REST client — both
//! are out of scope — so it starts every in-process subsystem and then
//! idles until told to shut down, the way a router sitting in front of it
//! would drive `JobRegistry`/`ServiceFactory` directly.

mod config;

use anyhow::{Context, Result};
use config::EngineConfig;
use spaudit_jobs::{Event, EventBus, JobRegistry};
use spaudit_notify::NotificationHub;
use spaudit_service::ServiceFactory;
use std::sync::Arc;
use tracing::info;

/// Bridges C7 (`EventBus`) to C8 (`NotificationHub`): every job lifecycle
/// event fans out to connected SSE clients as the corresponding broadcast.
/// `EventBus::subscribe`'s handler is synchronous, so the actual
/// (async) broadcast call is spawned from inside it.
async fn wire_notifications(bus: &EventBus, hub: NotificationHub) {
    bus.subscribe(
        None,
        Arc::new(move |event| {
            let hub = hub.clone();
            tokio::spawn(async move {
                match event {
                    Event::JobCreated { .. } | Event::JobCompleted { .. } | Event::JobFailed { .. } | Event::JobCancelled { .. } => {
                        hub.broadcast_job_list_update().await;
                    }
                    Event::JobProgress { job_id, .. } => {
                        hub.broadcast_job_update(job_id).await;
                    }
                    Event::SitesChanged => {
                        hub.broadcast_sites_update().await;
                    }
                }
            });
        }),
    )
    .await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    spaudit_logging::init_logging(config.log_config()).context("failed to initialize logging")?;

    info!(db_path = %config.db.path, "starting audit engine");
    let db = spaudit_db::open(&config.db).await.context("database open/migrate failed")?;

    let bus = EventBus::new();
    // No `SiteAuditExecutor` is registered here: it needs a concrete
    // `SharePointClient`, and that REST client is out of scope for this
    // crate. The HTTP/CLI binary that owns the client registers it with
    // `_registry.register_executor("site_audit", ...)` before calling
    // `start_job`.
    let _registry = JobRegistry::new(db.clone(), bus.clone());
    let _services = ServiceFactory::new(db.clone());
    let hub = NotificationHub::default();
    wire_notifications(&bus, hub.clone()).await;

    let reaper = hub.clone().spawn_reaper();

    info!("audit engine ready; waiting for shutdown signal");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received, closing notification clients");

    hub.close_all().await;
    reaper.abort();

    Ok(())
}
