//! Status command handler

use anyhow::{Context, Result};

use sheetsync_core::{Store, TenantId, TenantRegistry};

use crate::output::Output;

/// Show the sync-status banner of a tenant
pub fn show(
    store: &Store,
    registry: &TenantRegistry,
    tenant: TenantId,
    runs: usize,
    output: &Output,
) -> Result<()> {
    let schema = registry
        .get(tenant)
        .with_context(|| format!("Tenant {} is not configured", tenant))?;

    let count = store
        .record_count(tenant, schema.kind)
        .context("Failed to count records")?;
    let recent = store
        .recent_runs(tenant, runs.max(1))
        .context("Failed to read sync history")?;

    output.print_status(schema, count, &recent);
    Ok(())
}
