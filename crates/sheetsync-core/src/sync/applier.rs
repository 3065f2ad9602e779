//! Change Applier
//!
//! Turns a `MatchOutcome` into inserts, updates and deletes inside the
//! caller's transaction. Each row runs in its own savepoint: a constraint
//! failure rolls back that row only and is recorded in the result. Any
//! other database failure aborts the whole sync.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, Transaction};
use tracing::{debug, warn};

use super::matcher::{MatchOutcome, MatchedPair};
use crate::error::{RowIssue, SyncError, SyncOutcome};
use crate::models::{CanonicalField, CanonicalRecord, FieldMap, FieldValue, PersistedRecord, SyncResult};
use crate::storage::records;
use crate::tenant::{DeletionPolicy, TenantSchema};

/// What a single row did to the store
enum RowChange {
    Inserted,
    Updated,
    Deleted,
    Unchanged,
}

/// Apply a match outcome for one tenant
///
/// `present` lists the fields whose column exists in the live sheet; only
/// those are compared and written.
pub fn apply_changes(
    tx: &mut Transaction<'_>,
    schema: &TenantSchema,
    outcome: MatchOutcome,
    present: &BTreeSet<CanonicalField>,
    now: DateTime<Utc>,
    result: &mut SyncResult,
) -> SyncOutcome<()> {
    let diffable: Vec<CanonicalField> = schema
        .columns
        .iter()
        .map(|c| c.field)
        .filter(|f| present.contains(f))
        .collect();

    for ambiguous in &outcome.ambiguous {
        warn!(
            tenant = %schema.tenant_id,
            row_id = %ambiguous.row_id,
            kept = ambiguous.kept,
            others = ?ambiguous.others,
            "Ambiguous duplicate; leaving other records untouched"
        );
        result.skipped += ambiguous.others.len();
        result.push_error(&ambiguous.row_id, ambiguous.issue());
    }

    for pair in &outcome.pairs {
        let row_id = pair.source.row_id.clone();
        let change = in_savepoint(tx, |sp| update_pair(sp, schema, pair, &diffable, now));
        record(result, &row_id, change)?;
    }

    for source in &outcome.unmatched_source {
        let change = in_savepoint(tx, |sp| insert_source(sp, schema, source, present, now));
        record(result, &source.row_id, change)?;
    }

    for persisted in &outcome.unmatched_persisted {
        let row_id = persisted
            .sheet_row_id
            .clone()
            .unwrap_or_else(|| format!("record_{}", persisted.id));
        let change = in_savepoint(tx, |sp| retire(sp, schema, persisted, now));
        record(result, &row_id, change)?;
    }

    Ok(())
}

/// Run `f` in a savepoint, releasing it on success and rolling back on error
fn in_savepoint<F>(tx: &mut Transaction<'_>, f: F) -> rusqlite::Result<RowChange>
where
    F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<RowChange>,
{
    let sp = tx.savepoint()?;
    let change = f(&*sp)?;
    sp.commit()?;
    Ok(change)
}

/// Fold one row's outcome into the result
fn record(result: &mut SyncResult, row_id: &str, change: rusqlite::Result<RowChange>) -> SyncOutcome<()> {
    match change {
        Ok(RowChange::Inserted) => result.imported += 1,
        Ok(RowChange::Updated) => result.updated += 1,
        Ok(RowChange::Deleted) => result.deleted += 1,
        Ok(RowChange::Unchanged) => {}
        Err(e) if is_row_level(&e) => {
            warn!(row_id, "Row rejected by store: {}", e);
            result.push_error(row_id, RowIssue::Constraint(e.to_string()));
        }
        Err(e) => return Err(SyncError::Database(e)),
    }
    Ok(())
}

fn is_row_level(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Field-level diff between a row and its stored record
pub fn diff_fields(
    source: &CanonicalRecord,
    persisted: &PersistedRecord,
    fields: &[CanonicalField],
) -> Vec<(CanonicalField, Option<FieldValue>)> {
    fields
        .iter()
        .filter(|f| !source.rejected.contains(*f))
        .filter(|f| source.get(**f) != persisted.get(**f))
        .map(|f| (*f, source.get(*f).cloned()))
        .collect()
}

fn update_pair(
    conn: &rusqlite::Connection,
    schema: &TenantSchema,
    pair: &MatchedPair,
    diffable: &[CanonicalField],
    now: DateTime<Utc>,
) -> rusqlite::Result<RowChange> {
    let persisted = &pair.persisted;
    let mut changes = diff_fields(&pair.source, persisted, diffable);

    // A retired record whose row came back is revived
    if let Some(retired) = schema.retired_status() {
        let status_from_sheet = diffable.contains(&CanonicalField::Status);
        if !status_from_sheet && persisted.status() == Some(retired.as_str()) {
            changes.push((
                CanonicalField::Status,
                schema.default_status().map(FieldValue::Text),
            ));
        }
    }

    if pair.persisted.sheet_row_id.as_deref() != Some(pair.source.row_id.as_str()) {
        records::set_sheet_row_id(
            conn,
            schema.tenant_id,
            schema.kind,
            persisted.id,
            Some(&pair.source.row_id),
        )?;
    }

    if changes.is_empty() {
        return Ok(RowChange::Unchanged);
    }

    debug!(
        record_id = persisted.id,
        fields = ?changes.iter().map(|(f, _)| f.key()).collect::<Vec<_>>(),
        "Updating record"
    );
    records::update_fields(conn, schema.tenant_id, schema.kind, persisted.id, &changes, now)?;
    Ok(RowChange::Updated)
}

fn insert_source(
    conn: &rusqlite::Connection,
    schema: &TenantSchema,
    source: &CanonicalRecord,
    present: &BTreeSet<CanonicalField>,
    now: DateTime<Utc>,
) -> rusqlite::Result<RowChange> {
    let mut fields: FieldMap = source
        .fields
        .iter()
        .filter(|(f, _)| present.contains(*f))
        .map(|(f, v)| (*f, v.clone()))
        .collect();

    if !fields.contains_key(&CanonicalField::Status) && !present.contains(&CanonicalField::Status) {
        if let Some(status) = schema.default_status() {
            fields.insert(CanonicalField::Status, FieldValue::Text(status));
        }
    }

    let id = records::insert_record(conn, schema.tenant_id, schema.kind, &fields, Some(&source.row_id), now)?;
    debug!(record_id = id, row_id = %source.row_id, "Inserted record");
    Ok(RowChange::Inserted)
}

fn retire(
    conn: &rusqlite::Connection,
    schema: &TenantSchema,
    persisted: &PersistedRecord,
    now: DateTime<Utc>,
) -> rusqlite::Result<RowChange> {
    match &schema.deletion {
        DeletionPolicy::HardDelete => {
            records::delete_record(conn, schema.tenant_id, schema.kind, persisted.id)?;
            debug!(record_id = persisted.id, "Deleted record");
            Ok(RowChange::Deleted)
        }
        DeletionPolicy::Retain { .. } => {
            let status = schema.retired_status().unwrap_or_default();
            if persisted.status() == Some(status.as_str()) {
                return Ok(RowChange::Unchanged);
            }
            records::update_fields(
                conn,
                schema.tenant_id,
                schema.kind,
                persisted.id,
                &[(CanonicalField::Status, Some(FieldValue::Text(status)))],
                now,
            )?;
            // Free the row id so a new row at that position is not matched to it
            records::set_sheet_row_id(conn, schema.tenant_id, schema.kind, persisted.id, None)?;
            debug!(record_id = persisted.id, "Retired record");
            Ok(RowChange::Deleted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentityBundle, RecordKind, TenantId};
    use crate::storage::schema::init_schema;
    use crate::sync::matcher::match_records;
    use crate::tenant::ColumnMapping;
    use rusqlite::Connection;

    fn schema() -> TenantSchema {
        TenantSchema::new(
            TenantId(1),
            RecordKind::Candidate,
            vec![
                ColumnMapping::new("Name", CanonicalField::Name),
                ColumnMapping::new("Email", CanonicalField::Email),
                ColumnMapping::new("Status", CanonicalField::Status),
            ],
        )
    }

    fn all_present() -> BTreeSet<CanonicalField> {
        [CanonicalField::Name, CanonicalField::Email, CanonicalField::Status]
            .into_iter()
            .collect()
    }

    fn source(sheet_row: usize, pairs: &[(CanonicalField, &str)]) -> CanonicalRecord {
        let row_id = format!("row_{}", sheet_row);
        let fields: FieldMap = pairs
            .iter()
            .map(|(f, v)| (*f, FieldValue::Text(v.to_string())))
            .collect();
        CanonicalRecord {
            identity: IdentityBundle::from_fields(row_id.clone(), &fields),
            row_id,
            sheet_row,
            fields,
            extras: Default::default(),
            rejected: Default::default(),
        }
    }

    fn apply(conn: &mut Connection, schema: &TenantSchema, rows: Vec<CanonicalRecord>) -> SyncResult {
        let mut tx = conn.transaction().unwrap();
        let stored = records::load_for_tenant(&tx, schema.tenant_id, schema.kind).unwrap();
        let outcome = match_records(rows, stored);
        let mut result = SyncResult::default();
        apply_changes(&mut tx, schema, outcome, &all_present(), Utc::now(), &mut result).unwrap();
        tx.commit().unwrap();
        result
    }

    fn db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_update_delete() {
        let mut conn = db();
        let schema = schema();
        let asha = |status| {
            source(
                2,
                &[
                    (CanonicalField::Name, "Asha"),
                    (CanonicalField::Email, "asha@x.com"),
                    (CanonicalField::Status, status),
                ],
            )
        };

        let result = apply(&mut conn, &schema, vec![asha("pending")]);
        assert_eq!(result.imported, 1);

        let result = apply(&mut conn, &schema, vec![asha("pending")]);
        assert!(!result.has_changes());

        let result = apply(&mut conn, &schema, vec![asha("done")]);
        assert_eq!(result.updated, 1);

        let result = apply(&mut conn, &schema, vec![]);
        assert_eq!(result.deleted, 1);
        assert_eq!(records::count_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap(), 0);
    }

    #[test]
    fn test_constraint_failure_is_row_level() {
        let mut conn = db();
        conn.execute_batch(
            "CREATE TRIGGER reject_blocked BEFORE INSERT ON candidates
             WHEN NEW.email = 'blocked@x.com'
             BEGIN SELECT RAISE(ABORT, 'blocked address'); END;",
        )
        .unwrap();
        let schema = schema();
        let rows = vec![
            source(2, &[(CanonicalField::Name, "Al"), (CanonicalField::Email, "blocked@x.com")]),
            source(3, &[(CanonicalField::Name, "Bo"), (CanonicalField::Email, "bo@x.com")]),
        ];

        let result = apply(&mut conn, &schema, rows);
        assert_eq!(result.imported, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].row_id, "row_2");
        assert_eq!(result.errors[0].code(), "constraint_violation");
    }

    #[test]
    fn test_each_ambiguous_leftover_is_skipped() {
        let mut conn = db();
        let schema = schema();
        let ts = Utc::now();
        let map: FieldMap = [
            (CanonicalField::Name, FieldValue::Text("Ram".into())),
            (CanonicalField::Mobile, FieldValue::Text("999".into())),
        ]
        .into_iter()
        .collect();
        for _ in 0..3 {
            records::insert_record(&conn, TenantId(1), RecordKind::Candidate, &map, None, ts).unwrap();
        }
        let row = source(2, &[(CanonicalField::Name, "Ram"), (CanonicalField::Mobile, "999")]);

        let result = apply(&mut conn, &schema, vec![row]);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.deleted, 0);
        assert_eq!(records::count_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap(), 3);
    }

    #[test]
    fn test_retain_policy_flags_instead_of_deleting() {
        let mut conn = db();
        let mut schema = schema();
        schema.deletion = DeletionPolicy::Retain {
            status: "Archived".to_string(),
        };
        let row = source(2, &[(CanonicalField::Name, "Asha"), (CanonicalField::Email, "asha@x.com")]);

        apply(&mut conn, &schema, vec![row]);
        let result = apply(&mut conn, &schema, vec![]);
        assert_eq!(result.deleted, 1);

        let stored = records::load_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status(), Some("archived"));
        assert!(stored[0].sheet_row_id.is_none());

        // Already retired: not counted again
        let result = apply(&mut conn, &schema, vec![]);
        assert_eq!(result.deleted, 0);
    }

    #[test]
    fn test_absent_columns_are_not_diffed() {
        let mut conn = db();
        let schema = schema();
        let full = source(
            2,
            &[
                (CanonicalField::Name, "Asha"),
                (CanonicalField::Email, "asha@x.com"),
                (CanonicalField::Status, "shortlisted"),
            ],
        );
        apply(&mut conn, &schema, vec![full]);

        // Status column removed from the sheet
        let mut tx = conn.transaction().unwrap();
        let stored = records::load_for_tenant(&tx, TenantId(1), RecordKind::Candidate).unwrap();
        let row = source(2, &[(CanonicalField::Name, "Asha"), (CanonicalField::Email, "asha@x.com")]);
        let outcome = match_records(vec![row], stored);
        let present: BTreeSet<_> = [CanonicalField::Name, CanonicalField::Email].into_iter().collect();
        let mut result = SyncResult::default();
        apply_changes(&mut tx, &schema, outcome, &present, Utc::now(), &mut result).unwrap();
        tx.commit().unwrap();

        assert_eq!(result.updated, 0);
        let stored = records::load_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap();
        assert_eq!(stored[0].status(), Some("shortlisted"));
    }

    #[test]
    fn test_default_status_on_insert_when_unmapped() {
        let mut conn = db();
        let mut schema = TenantSchema::new(
            TenantId(1),
            RecordKind::Candidate,
            vec![
                ColumnMapping::new("Name", CanonicalField::Name),
                ColumnMapping::new("Email", CanonicalField::Email),
            ],
        );
        schema.default_status = Some("pending".to_string());

        let mut tx = conn.transaction().unwrap();
        let row = source(2, &[(CanonicalField::Name, "Asha"), (CanonicalField::Email, "asha@x.com")]);
        let outcome = match_records(vec![row], Vec::new());
        let present: BTreeSet<_> = [CanonicalField::Name, CanonicalField::Email].into_iter().collect();
        let mut result = SyncResult::default();
        apply_changes(&mut tx, &schema, outcome, &present, Utc::now(), &mut result).unwrap();
        tx.commit().unwrap();

        let stored = records::load_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap();
        assert_eq!(stored[0].status(), Some("pending"));
    }

    #[test]
    fn test_row_id_refresh_is_not_an_update() {
        let mut conn = db();
        let schema = schema();
        let at = |row| source(row, &[(CanonicalField::Name, "Asha"), (CanonicalField::Email, "asha@x.com")]);

        apply(&mut conn, &schema, vec![at(2)]);
        let result = apply(&mut conn, &schema, vec![at(5)]);
        assert_eq!(result.updated, 0);

        let stored = records::load_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap();
        assert_eq!(stored[0].sheet_row_id.as_deref(), Some("row_5"));
    }

    #[test]
    fn test_rejected_cell_keeps_stored_value() {
        let mut conn = db();
        let schema = schema();
        let row = |status: &str| {
            source(
                2,
                &[
                    (CanonicalField::Name, "Asha"),
                    (CanonicalField::Email, "asha@x.com"),
                    (CanonicalField::Status, status),
                ],
            )
        };
        apply(&mut conn, &schema, vec![row("pending")]);

        // The status cell failed to parse on this pass
        let mut unreadable = row("pending");
        unreadable.fields.remove(&CanonicalField::Status);
        unreadable.rejected.insert(CanonicalField::Status);
        let result = apply(&mut conn, &schema, vec![unreadable]);

        assert_eq!(result.updated, 0);
        let stored = records::load_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap();
        assert_eq!(stored[0].status(), Some("pending"));
    }
}
