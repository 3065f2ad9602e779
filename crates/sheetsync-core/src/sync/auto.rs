//! Periodic auto-sync
//!
//! A background task that pulls every tenant with `auto_sync = true` on a
//! fixed interval. It shares the engine (and therefore the per-tenant locks)
//! with every other trigger, so a tenant already being synced is reported
//! and skipped for that tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::SyncEngine;
use crate::models::{SyncResult, TenantId};
use crate::tenant::TenantRegistry;

/// Commands sent to the auto-sync task
#[derive(Debug, Clone)]
pub enum AutoSyncCommand {
    /// Run a round now instead of waiting for the next tick
    SyncNow,
    /// Stop the task
    Shutdown,
}

/// Events emitted by the auto-sync task
#[derive(Debug, Clone)]
pub enum AutoSyncEvent {
    /// A tenant was pulled successfully
    TenantSynced { tenant: TenantId, result: SyncResult },
    /// A tenant's pull failed; nothing was changed
    TenantFailed { tenant: TenantId, error: String },
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSyncStatus {
    /// Waiting for the next tick
    Idle,
    /// Running a round
    Syncing,
    /// Task has exited
    Stopped,
}

/// Handle to control the auto-sync task
pub struct AutoSyncHandle {
    /// Send commands to the task
    pub command_tx: mpsc::Sender<AutoSyncCommand>,
    /// Receive per-tenant events
    pub event_rx: mpsc::Receiver<AutoSyncEvent>,
    /// Watch task status
    pub status_rx: watch::Receiver<AutoSyncStatus>,
}

/// Spawn the auto-sync task
///
/// The first round runs immediately.
pub fn spawn_auto_sync(
    engine: Arc<SyncEngine>,
    registry: Arc<TenantRegistry>,
    interval: Duration,
) -> AutoSyncHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (status_tx, status_rx) = watch::channel(AutoSyncStatus::Idle);

    tokio::spawn(auto_sync_loop(
        engine, registry, interval, command_rx, event_tx, status_tx,
    ));

    AutoSyncHandle {
        command_tx,
        event_rx,
        status_rx,
    }
}

async fn auto_sync_loop(
    engine: Arc<SyncEngine>,
    registry: Arc<TenantRegistry>,
    interval: Duration,
    mut command_rx: mpsc::Receiver<AutoSyncCommand>,
    event_tx: mpsc::Sender<AutoSyncEvent>,
    status_tx: watch::Sender<AutoSyncStatus>,
) {
    let tenants: Vec<TenantId> = registry
        .tenants()
        .filter(|t| t.auto_sync)
        .map(|t| t.tenant_id)
        .collect();
    info!(tenants = tenants.len(), interval_secs = interval.as_secs(), "Auto-sync started");

    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            cmd = command_rx.recv() => {
                match cmd {
                    Some(AutoSyncCommand::SyncNow) => debug!("Auto-sync round requested"),
                    Some(AutoSyncCommand::Shutdown) | None => break,
                }
            }
        }

        let _ = status_tx.send(AutoSyncStatus::Syncing);
        for tenant in &tenants {
            let event = match engine.sync_tenant(*tenant).await {
                Ok(result) => AutoSyncEvent::TenantSynced {
                    tenant: *tenant,
                    result,
                },
                Err(e) => {
                    warn!(tenant = %tenant, "Auto-sync failed: {}", e);
                    AutoSyncEvent::TenantFailed {
                        tenant: *tenant,
                        error: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event).await;
        }
        let _ = status_tx.send(AutoSyncStatus::Idle);
    }

    let _ = status_tx.send(AutoSyncStatus::Stopped);
    info!("Auto-sync stopped");
}
