//! Watch command handler

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use sheetsync_core::sync::{spawn_auto_sync, AutoSyncCommand, AutoSyncEvent};
use sheetsync_core::{SyncEngine, TenantRegistry};

use crate::output::Output;

/// Pull every auto-sync tenant on an interval until Ctrl-C
pub async fn run(
    engine: Arc<SyncEngine>,
    registry: Arc<TenantRegistry>,
    interval_secs: u64,
    output: &Output,
) -> Result<()> {
    let watched = registry.tenants().filter(|t| t.auto_sync).count();
    if watched == 0 {
        output.message("No tenants have auto_sync enabled; nothing to watch.");
        return Ok(());
    }

    output.message(&format!(
        "Watching {} tenant(s) every {}s. Press Ctrl-C to stop.",
        watched, interval_secs
    ));
    let mut handle = spawn_auto_sync(engine, registry, Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping auto-sync");
                let _ = handle.command_tx.send(AutoSyncCommand::Shutdown).await;
                break;
            }
            event = handle.event_rx.recv() => {
                match event {
                    Some(AutoSyncEvent::TenantSynced { tenant, result }) => {
                        output.print_sync_result(tenant, &result);
                    }
                    Some(AutoSyncEvent::TenantFailed { tenant, error }) => {
                        output.message(&format!("✗ Tenant {}: sync failed, nothing changed: {}", tenant, error));
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}
