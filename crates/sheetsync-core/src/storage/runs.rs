//! Sync run history
//!
//! Backs the "last synced" banner: one row per pull or push call.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result};
use serde::Serialize;

use crate::models::{SyncResult, TenantId};

/// Which way a sync call moved data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Sheet to store
    Pull,
    /// Store to sheet
    Push,
}

impl SyncDirection {
    fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Pull => "pull",
            SyncDirection::Push => "push",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "push" => SyncDirection::Push,
            _ => SyncDirection::Pull,
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded sync call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub tenant_id: TenantId,
    pub direction: SyncDirection,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub imported: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub exported: usize,
    pub error_count: usize,
    /// Set when the call failed and nothing was changed
    pub failure: Option<String>,
}

impl SyncRun {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Store the outcome of one call
///
/// `outcome` is the result on success or the failure message otherwise.
pub fn record_run(
    conn: &Connection,
    tenant_id: TenantId,
    direction: SyncDirection,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    outcome: std::result::Result<&SyncResult, &str>,
) -> Result<i64> {
    let empty = SyncResult::default();
    let (result, failure) = match outcome {
        Ok(result) => (result, None),
        Err(message) => (&empty, Some(message)),
    };

    conn.execute(
        "INSERT INTO sync_runs (tenant_id, direction, started_at, finished_at, imported, updated, deleted, skipped, exported, error_count, failure)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            tenant_id.0,
            direction.as_str(),
            started_at.timestamp_millis(),
            finished_at.timestamp_millis(),
            result.imported as i64,
            result.updated as i64,
            result.deleted as i64,
            result.skipped as i64,
            result.exported as i64,
            result.errors.len() as i64,
            failure,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent runs of a tenant, newest first
pub fn recent_runs(conn: &Connection, tenant_id: TenantId, limit: usize) -> Result<Vec<SyncRun>> {
    let mut stmt = conn.prepare(
        "SELECT id, direction, started_at, finished_at, imported, updated, deleted, skipped, exported, error_count, failure
         FROM sync_runs WHERE tenant_id = ? ORDER BY finished_at DESC, id DESC LIMIT ?",
    )?;

    let rows = stmt.query_map(params![tenant_id.0, limit as i64], |row| {
        let direction: String = row.get(1)?;
        let count = |idx: usize| row.get::<_, i64>(idx).map(|n| n.max(0) as usize);
        Ok(SyncRun {
            id: row.get(0)?,
            tenant_id,
            direction: SyncDirection::parse(&direction),
            started_at: DateTime::from_timestamp_millis(row.get(2)?).unwrap_or_default(),
            finished_at: DateTime::from_timestamp_millis(row.get(3)?).unwrap_or_default(),
            imported: count(4)?,
            updated: count(5)?,
            deleted: count(6)?,
            skipped: count(7)?,
            exported: count(8)?,
            error_count: count(9)?,
            failure: row.get(10)?,
        })
    })?;

    let mut runs = Vec::new();
    for run in rows {
        runs.push(run?);
    }
    Ok(runs)
}

/// Latest run of a tenant, if any
pub fn last_run(conn: &Connection, tenant_id: TenantId) -> Result<Option<SyncRun>> {
    Ok(recent_runs(conn, tenant_id, 1)?.into_iter().next())
}
