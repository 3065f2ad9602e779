//! Tenant-scoped record CRUD
//!
//! Column names come from `CanonicalField::key`, never from input, so the
//! dynamic SQL below only ever interpolates static identifiers. Every
//! statement filters on `tenant_id`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Result, Row};

use crate::models::{CanonicalField, FieldMap, FieldType, FieldValue, PersistedRecord, RecordKind, TenantId};

/// ISO date format used for date columns
const STORE_DATE_FORMAT: &str = "%Y-%m-%d";

fn column_list(kind: RecordKind) -> String {
    kind.fields().iter().map(|f| f.key()).collect::<Vec<_>>().join(", ")
}

/// Convert a field value into an SQL value
pub(crate) fn to_sql(value: Option<&FieldValue>) -> Value {
    match value {
        None => Value::Null,
        Some(FieldValue::Text(s)) => Value::Text(s.clone()),
        Some(FieldValue::Number(n)) => Value::Real(*n),
        Some(FieldValue::Date(d)) => Value::Text(d.format(STORE_DATE_FORMAT).to_string()),
    }
}

/// Convert a stored column back into a field value
fn from_sql(field: CanonicalField, value: ValueRef<'_>) -> Option<FieldValue> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(match field.field_type() {
            FieldType::Number => FieldValue::Number(i as f64),
            _ => FieldValue::Text(i.to_string()),
        }),
        ValueRef::Real(n) => Some(FieldValue::Number(n)),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            let value = match field.field_type() {
                FieldType::Date => NaiveDate::parse_from_str(&text, STORE_DATE_FORMAT)
                    .map(FieldValue::Date)
                    .unwrap_or(FieldValue::Text(text)),
                FieldType::Number => text
                    .parse::<f64>()
                    .map(FieldValue::Number)
                    .unwrap_or(FieldValue::Text(text)),
                FieldType::Text | FieldType::Status | FieldType::Vertical => FieldValue::Text(text),
            };
            Some(value)
        }
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn hydrate(row: &Row<'_>, tenant_id: TenantId, kind: RecordKind) -> Result<PersistedRecord> {
    // Layout: id, sheet_row_id, created_at, updated_at, then kind.fields()
    let mut fields = FieldMap::new();
    for (i, field) in kind.fields().iter().enumerate() {
        if let Some(value) = from_sql(*field, row.get_ref(4 + i)?) {
            fields.insert(*field, value);
        }
    }

    Ok(PersistedRecord {
        id: row.get(0)?,
        tenant_id,
        kind,
        fields,
        sheet_row_id: row.get(1)?,
        created_at: millis_to_datetime(row.get(2)?),
        updated_at: millis_to_datetime(row.get(3)?),
    })
}

/// Load every record of a tenant, oldest first
pub fn load_for_tenant(conn: &Connection, tenant_id: TenantId, kind: RecordKind) -> Result<Vec<PersistedRecord>> {
    let sql = format!(
        "SELECT id, sheet_row_id, created_at, updated_at, {} FROM {} WHERE tenant_id = ? ORDER BY created_at, id",
        column_list(kind),
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([tenant_id.0], |row| hydrate(row, tenant_id, kind))?;
    rows.collect()
}

/// Load one record of a tenant
pub fn get_record(conn: &Connection, tenant_id: TenantId, kind: RecordKind, id: i64) -> Result<Option<PersistedRecord>> {
    let sql = format!(
        "SELECT id, sheet_row_id, created_at, updated_at, {} FROM {} WHERE tenant_id = ? AND id = ?",
        column_list(kind),
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![tenant_id.0, id], |row| hydrate(row, tenant_id, kind))?;
    rows.next().transpose()
}

/// Insert a new record owned by `tenant_id`
pub fn insert_record(
    conn: &Connection,
    tenant_id: TenantId,
    kind: RecordKind,
    fields: &FieldMap,
    sheet_row_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<i64> {
    let owned: Vec<CanonicalField> = fields.keys().copied().filter(|f| kind.supports(*f)).collect();

    let mut columns = vec!["tenant_id", "sheet_row_id", "created_at", "updated_at"];
    columns.extend(owned.iter().map(|f| f.key()));
    let placeholders = vec!["?"; columns.len()].join(", ");

    let mut values = vec![
        Value::Integer(tenant_id.0),
        sheet_row_id.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null),
        Value::Integer(now.timestamp_millis()),
        Value::Integer(now.timestamp_millis()),
    ];
    values.extend(owned.iter().map(|f| to_sql(fields.get(f))));

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        kind.table(),
        columns.join(", "),
        placeholders
    );
    conn.execute(&sql, params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite the given fields and bump `updated_at`
///
/// A `None` value clears the column. Returns the number of rows touched.
pub fn update_fields(
    conn: &Connection,
    tenant_id: TenantId,
    kind: RecordKind,
    id: i64,
    changes: &[(CanonicalField, Option<FieldValue>)],
    now: DateTime<Utc>,
) -> Result<usize> {
    if changes.is_empty() {
        return Ok(0);
    }

    let assignments: Vec<String> = changes.iter().map(|(f, _)| format!("{} = ?", f.key())).collect();
    let mut values: Vec<Value> = changes.iter().map(|(_, v)| to_sql(v.as_ref())).collect();
    values.push(Value::Integer(now.timestamp_millis()));
    values.push(Value::Integer(tenant_id.0));
    values.push(Value::Integer(id));

    let sql = format!(
        "UPDATE {} SET {}, updated_at = ? WHERE tenant_id = ? AND id = ?",
        kind.table(),
        assignments.join(", ")
    );
    conn.execute(&sql, params_from_iter(values))
}

/// Record the sheet row a record was last matched from
///
/// Bookkeeping only; `updated_at` is left alone.
pub fn set_sheet_row_id(
    conn: &Connection,
    tenant_id: TenantId,
    kind: RecordKind,
    id: i64,
    sheet_row_id: Option<&str>,
) -> Result<usize> {
    let sql = format!(
        "UPDATE {} SET sheet_row_id = ? WHERE tenant_id = ? AND id = ?",
        kind.table()
    );
    conn.execute(&sql, params![sheet_row_id, tenant_id.0, id])
}

/// Remove a record
pub fn delete_record(conn: &Connection, tenant_id: TenantId, kind: RecordKind, id: i64) -> Result<usize> {
    let sql = format!("DELETE FROM {} WHERE tenant_id = ? AND id = ?", kind.table());
    conn.execute(&sql, params![tenant_id.0, id])
}

/// Number of records a tenant owns
pub fn count_for_tenant(conn: &Connection, tenant_id: TenantId, kind: RecordKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE tenant_id = ?", kind.table());
    conn.query_row(&sql, [tenant_id.0], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;
    use chrono::TimeZone;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap()
    }

    fn fields(pairs: &[(CanonicalField, FieldValue)]) -> FieldMap {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_insert_and_load() {
        let conn = conn();
        let map = fields(&[
            (CanonicalField::Name, FieldValue::Text("Asha Rao".into())),
            (CanonicalField::Premium, FieldValue::Number(12500.0)),
            (
                CanonicalField::RenewalDate,
                FieldValue::Date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            ),
            (CanonicalField::Notes, FieldValue::Text("call after 5".into())),
        ]);

        let id = insert_record(&conn, TenantId(1), RecordKind::InsuranceCustomer, &map, Some("row_2"), now()).unwrap();
        let records = load_for_tenant(&conn, TenantId(1), RecordKind::InsuranceCustomer).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].fields, map);
        assert_eq!(records[0].sheet_row_id.as_deref(), Some("row_2"));
        assert_eq!(records[0].created_at, now());
    }

    #[test]
    fn test_insert_ignores_fields_of_other_kind() {
        let conn = conn();
        let map = fields(&[
            (CanonicalField::Name, FieldValue::Text("Asha".into())),
            (CanonicalField::Premium, FieldValue::Number(1.0)),
        ]);
        insert_record(&conn, TenantId(1), RecordKind::Candidate, &map, None, now()).unwrap();

        let records = load_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap();
        assert!(records[0].get(CanonicalField::Premium).is_none());
    }

    #[test]
    fn test_email_only_record_inserts() {
        let conn = conn();
        let map = fields(&[(CanonicalField::Email, FieldValue::Text("a@x.com".into()))]);
        let id = insert_record(&conn, TenantId(1), RecordKind::Candidate, &map, None, now()).unwrap();

        let record = get_record(&conn, TenantId(1), RecordKind::Candidate, id).unwrap().unwrap();
        assert_eq!(record.get(CanonicalField::Name), None);
        assert!(record.identity().is_usable());
    }

    #[test]
    fn test_update_is_tenant_scoped() {
        let conn = conn();
        let map = fields(&[(CanonicalField::Name, FieldValue::Text("Asha".into()))]);
        let id = insert_record(&conn, TenantId(1), RecordKind::Candidate, &map, None, now()).unwrap();

        let changes = vec![(CanonicalField::Status, Some(FieldValue::Text("done".into())))];
        let later = now() + chrono::Duration::minutes(5);

        assert_eq!(update_fields(&conn, TenantId(2), RecordKind::Candidate, id, &changes, later).unwrap(), 0);
        assert_eq!(update_fields(&conn, TenantId(1), RecordKind::Candidate, id, &changes, later).unwrap(), 1);

        let record = get_record(&conn, TenantId(1), RecordKind::Candidate, id).unwrap().unwrap();
        assert_eq!(record.status(), Some("done"));
        assert_eq!(record.updated_at, later);
        assert_eq!(record.created_at, now());
    }

    #[test]
    fn test_update_can_clear_a_field() {
        let conn = conn();
        let map = fields(&[
            (CanonicalField::Name, FieldValue::Text("Asha".into())),
            (CanonicalField::Notes, FieldValue::Text("old".into())),
        ]);
        let id = insert_record(&conn, TenantId(1), RecordKind::Candidate, &map, None, now()).unwrap();

        update_fields(&conn, TenantId(1), RecordKind::Candidate, id, &[(CanonicalField::Notes, None)], now()).unwrap();
        let record = get_record(&conn, TenantId(1), RecordKind::Candidate, id).unwrap().unwrap();
        assert!(record.get(CanonicalField::Notes).is_none());
    }

    #[test]
    fn test_sheet_row_id_and_delete() {
        let conn = conn();
        let map = fields(&[(CanonicalField::Name, FieldValue::Text("Asha".into()))]);
        let id = insert_record(&conn, TenantId(1), RecordKind::Candidate, &map, None, now()).unwrap();

        set_sheet_row_id(&conn, TenantId(1), RecordKind::Candidate, id, Some("row_9")).unwrap();
        let record = get_record(&conn, TenantId(1), RecordKind::Candidate, id).unwrap().unwrap();
        assert_eq!(record.sheet_row_id.as_deref(), Some("row_9"));

        assert_eq!(delete_record(&conn, TenantId(2), RecordKind::Candidate, id).unwrap(), 0);
        assert_eq!(delete_record(&conn, TenantId(1), RecordKind::Candidate, id).unwrap(), 1);
        assert_eq!(count_for_tenant(&conn, TenantId(1), RecordKind::Candidate).unwrap(), 0);
    }

    #[test]
    fn test_load_orders_by_creation() {
        let conn = conn();
        let later = fields(&[(CanonicalField::Name, FieldValue::Text("Later".into()))]);
        let earlier = fields(&[(CanonicalField::Name, FieldValue::Text("Earlier".into()))]);
        insert_record(&conn, TenantId(1), RecordKind::Candidate, &later, None, now()).unwrap();
        insert_record(
            &conn,
            TenantId(1),
            RecordKind::Candidate,
            &earlier,
            None,
            now() - chrono::Duration::days(1),
        )
        .unwrap();

        let names: Vec<_> = load_for_tenant(&conn, TenantId(1), RecordKind::Candidate)
            .unwrap()
            .iter()
            .map(|r| r.get(CanonicalField::Name).map(FieldValue::render).unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["Earlier", "Later"]);
    }
}
