//! Sync Orchestrator
//!
//! Entry points called by trigger layers (CLI, timers, post-mutation hooks).
//! Each call takes the tenant's lock, loads the tenant schema and runs
//! Reader → Mapper → Matcher → Applier (pull) or Reader → plan → write
//! (push) as one linear sequence. The outcome of every call that got past
//! the lock is written to the run history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::locks::TenantLocks;
use super::mapper::map_sheet;
use super::push::plan_push;
use crate::error::SyncOutcome;
use crate::models::{PushResult, SyncResult, TenantId};
use crate::sheets::{spreadsheet_id_from_url, SpreadsheetReader};
use crate::storage::SyncDirection;
use crate::store::Store;
use crate::tenant::{SchemaSource, TenantSchema};

/// Reconciliation engine shared by every trigger
pub struct SyncEngine {
    store: Arc<Store>,
    reader: SpreadsheetReader,
    schemas: Arc<dyn SchemaSource>,
    locks: TenantLocks,
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, reader: SpreadsheetReader, schemas: Arc<dyn SchemaSource>) -> Self {
        Self {
            store,
            reader,
            schemas,
            locks: TenantLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Per-tenant locks held by in-flight calls
    pub fn locks(&self) -> &TenantLocks {
        &self.locks
    }

    pub fn schema(&self, tenant_id: TenantId) -> SyncOutcome<TenantSchema> {
        self.schemas.schema_for(tenant_id)
    }

    // ==================== Pull ====================

    /// Mirror a tenant's sheet into the store
    ///
    /// `spreadsheet_id` may be a full spreadsheet URL.
    pub async fn sync_from_sheet(
        &self,
        tenant_id: TenantId,
        spreadsheet_id: &str,
        tab: &str,
    ) -> SyncOutcome<SyncResult> {
        let _lock = self.locks.try_acquire(tenant_id)?;
        let started = Utc::now();

        let outcome = self.pull(tenant_id, spreadsheet_id, tab).await;
        self.finish(tenant_id, SyncDirection::Pull, started, outcome.as_ref().map_err(|e| e.to_string()));
        outcome
    }

    /// Pull using the spreadsheet and tab configured for the tenant
    pub async fn sync_tenant(&self, tenant_id: TenantId) -> SyncOutcome<SyncResult> {
        let schema = self.schema(tenant_id)?;
        let (spreadsheet_id, tab) = schema.target()?;
        self.sync_from_sheet(tenant_id, spreadsheet_id, tab).await
    }

    async fn pull(&self, tenant_id: TenantId, spreadsheet_id: &str, tab: &str) -> SyncOutcome<SyncResult> {
        let schema = self.schema(tenant_id)?;
        let spreadsheet_id = spreadsheet_id_from_url(spreadsheet_id);
        info!(tenant = %tenant_id, spreadsheet_id = %spreadsheet_id, tab, "Sync from sheet started");

        let data = self.reader.read_sheet(&spreadsheet_id, tab).await?;
        let mapped = map_sheet(&data, &schema)?;
        debug!(
            tenant = %tenant_id,
            records = mapped.records.len(),
            unidentified = mapped.unidentified.len(),
            "Mapped sheet rows"
        );

        let result = self.store.reconcile(&schema, mapped, Utc::now())?;
        info!(
            tenant = %tenant_id,
            imported = result.imported,
            updated = result.updated,
            deleted = result.deleted,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Sync from sheet finished"
        );
        Ok(result)
    }

    // ==================== Push ====================

    /// Write the tenant's records back into its sheet
    ///
    /// Reported as a `SyncResult` with only `exported` (and warnings) set.
    pub async fn sync_to_sheet(
        &self,
        tenant_id: TenantId,
        spreadsheet_id: &str,
        tab: &str,
    ) -> SyncOutcome<SyncResult> {
        let pushed = self.push_to_sheet(tenant_id, spreadsheet_id, tab).await?;
        Ok(SyncResult {
            exported: pushed.exported,
            warnings: pushed.warnings,
            ..Default::default()
        })
    }

    /// Write the tenant's records back into its sheet
    pub async fn push_to_sheet(
        &self,
        tenant_id: TenantId,
        spreadsheet_id: &str,
        tab: &str,
    ) -> SyncOutcome<PushResult> {
        let _lock = self.locks.try_acquire(tenant_id)?;
        let started = Utc::now();

        let outcome = self.push(tenant_id, spreadsheet_id, tab).await;
        let summary = outcome.as_ref().map(|pushed| SyncResult {
            exported: pushed.exported,
            warnings: pushed.warnings.clone(),
            ..Default::default()
        });
        self.finish(tenant_id, SyncDirection::Push, started, summary.as_ref().map_err(|e| e.to_string()));
        outcome
    }

    /// Push using the spreadsheet and tab configured for the tenant
    pub async fn push_tenant(&self, tenant_id: TenantId) -> SyncOutcome<PushResult> {
        let schema = self.schema(tenant_id)?;
        let (spreadsheet_id, tab) = schema.target()?;
        self.push_to_sheet(tenant_id, spreadsheet_id, tab).await
    }

    async fn push(&self, tenant_id: TenantId, spreadsheet_id: &str, tab: &str) -> SyncOutcome<PushResult> {
        let schema = self.schema(tenant_id)?;
        let spreadsheet_id = spreadsheet_id_from_url(spreadsheet_id);
        info!(tenant = %tenant_id, spreadsheet_id = %spreadsheet_id, tab, "Push to sheet started");

        let data = self.reader.read_sheet(&spreadsheet_id, tab).await?;
        let records = self.store.records(tenant_id, schema.kind)?;
        let plan = plan_push(&schema, &data, &records);

        if !plan.is_empty() {
            debug!(tenant = %tenant_id, ranges = plan.updates.len(), "Writing ranges");
            self.reader.write(&spreadsheet_id, tab, &plan.updates).await?;
        }
        self.store.assign_row_ids(tenant_id, schema.kind, &plan.placements)?;

        info!(
            tenant = %tenant_id,
            exported = plan.exported,
            cleared = plan.cleared_rows,
            "Push to sheet finished"
        );
        Ok(PushResult {
            exported: plan.exported,
            cleared_rows: plan.cleared_rows,
            warnings: plan.warnings,
        })
    }

    /// Write the run history row; a failure here never fails the call
    fn finish(
        &self,
        tenant_id: TenantId,
        direction: SyncDirection,
        started: DateTime<Utc>,
        outcome: Result<&SyncResult, String>,
    ) {
        if let Err(message) = &outcome {
            warn!(tenant = %tenant_id, %direction, "Sync failed, nothing changed: {}", message);
        }
        let recorded = self.store.record_run(
            tenant_id,
            direction,
            started,
            Utc::now(),
            outcome.as_ref().map(|r| *r).map_err(String::as_str),
        );
        if let Err(e) = recorded {
            warn!(tenant = %tenant_id, "Failed to record sync run: {}", e);
        }
    }
}
