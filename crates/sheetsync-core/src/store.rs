//! Relational store
//!
//! The `Store` owns the SQLite connection and the transaction boundary of a
//! sync pass. Record-level SQL lives in `storage::records`; this type wires
//! the matcher and applier into one transaction per call.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open(&config)?;
//! let result = store.reconcile(&schema, mapped, Utc::now())?;
//! let banner = store.last_run(tenant_id)?;
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::config::Config;
use crate::error::{RowIssue, SyncError, SyncOutcome};
use crate::models::{CanonicalField, FieldMap, FieldValue, PersistedRecord, RecordKind, SyncResult, TenantId};
use crate::storage::records;
use crate::storage::runs::{self, SyncDirection, SyncRun};
use crate::storage::{init_schema, needs_init};
use crate::sync::applier::apply_changes;
use crate::sync::mapper::MappedSheet;
use crate::sync::matcher::match_records;
use crate::tenant::TenantSchema;

/// SQLite-backed mirror of every tenant's sheet
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the database under the configured data directory
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_path(&config.database_path())
    }

    /// Open (and initialize if needed) the database at `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn).context("Failed to initialize SQLite schema")?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-call rolls back its transaction, so the connection is still sound
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ==================== Sync ====================

    /// Reconcile a mapped sheet against the tenant's stored records
    ///
    /// Runs match + apply inside one transaction. Row-level failures are
    /// folded into the result; a failed commit aborts the whole call.
    pub fn reconcile(
        &self,
        schema: &TenantSchema,
        mapped: MappedSheet,
        now: DateTime<Utc>,
    ) -> SyncOutcome<SyncResult> {
        let MappedSheet {
            records: incoming,
            unidentified,
            issues,
            warnings,
            present,
        } = mapped;

        let mut conn = self.conn();
        let mut tx = conn.transaction()?;

        let existing = records::load_for_tenant(&tx, schema.tenant_id, schema.kind)?;
        debug!(
            tenant = %schema.tenant_id,
            incoming = incoming.len(),
            existing = existing.len(),
            "Matching rows"
        );
        let outcome = match_records(incoming, existing);

        let mut result = SyncResult {
            warnings,
            ..Default::default()
        };
        for row_id in unidentified {
            result.skipped += 1;
            result.push_error(row_id, RowIssue::MissingIdentity);
        }
        for (row_id, issue) in issues {
            result.push_error(row_id, issue);
        }

        apply_changes(&mut tx, schema, outcome, &present, now, &mut result)?;
        tx.commit().map_err(SyncError::Commit)?;

        Ok(result)
    }

    /// Record the sheet rows a push placed records on
    pub fn assign_row_ids(
        &self,
        tenant_id: TenantId,
        kind: RecordKind,
        placements: &[(i64, String)],
    ) -> SyncOutcome<()> {
        if placements.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (id, row_id) in placements {
            records::set_sheet_row_id(&tx, tenant_id, kind, *id, Some(row_id))?;
        }
        tx.commit().map_err(SyncError::Commit)
    }

    // ==================== Records ====================

    /// Every record of a tenant, oldest first
    pub fn records(&self, tenant_id: TenantId, kind: RecordKind) -> SyncOutcome<Vec<PersistedRecord>> {
        Ok(records::load_for_tenant(&self.conn(), tenant_id, kind)?)
    }

    pub fn get_record(
        &self,
        tenant_id: TenantId,
        kind: RecordKind,
        id: i64,
    ) -> SyncOutcome<Option<PersistedRecord>> {
        Ok(records::get_record(&self.conn(), tenant_id, kind, id)?)
    }

    pub fn record_count(&self, tenant_id: TenantId, kind: RecordKind) -> SyncOutcome<usize> {
        let count = records::count_for_tenant(&self.conn(), tenant_id, kind)?;
        Ok(count.max(0) as usize)
    }

    /// Create a record from the application side (no sheet row yet)
    pub fn insert_record(&self, tenant_id: TenantId, kind: RecordKind, fields: &FieldMap) -> SyncOutcome<i64> {
        Ok(records::insert_record(&self.conn(), tenant_id, kind, fields, None, Utc::now())?)
    }

    /// Change fields from the application side, e.g. a business status
    pub fn update_record_fields(
        &self,
        tenant_id: TenantId,
        kind: RecordKind,
        id: i64,
        changes: &[(CanonicalField, Option<FieldValue>)],
    ) -> SyncOutcome<bool> {
        let touched = records::update_fields(&self.conn(), tenant_id, kind, id, changes, Utc::now())?;
        Ok(touched > 0)
    }

    // ==================== Run history ====================

    /// Store the outcome of one sync call
    pub fn record_run(
        &self,
        tenant_id: TenantId,
        direction: SyncDirection,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcome: std::result::Result<&SyncResult, &str>,
    ) -> SyncOutcome<i64> {
        Ok(runs::record_run(
            &self.conn(),
            tenant_id,
            direction,
            started_at,
            finished_at,
            outcome,
        )?)
    }

    /// Latest run of a tenant, for the sync-status banner
    pub fn last_run(&self, tenant_id: TenantId) -> SyncOutcome<Option<SyncRun>> {
        Ok(runs::last_run(&self.conn(), tenant_id)?)
    }

    pub fn recent_runs(&self, tenant_id: TenantId, limit: usize) -> SyncOutcome<Vec<SyncRun>> {
        Ok(runs::recent_runs(&self.conn(), tenant_id, limit)?)
    }
}
