//! SQLite schema for the relational mirror
//!
//! One table per record kind. Every record row carries the owning
//! `tenant_id`; every query in this crate filters on it.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Job candidates
        CREATE TABLE IF NOT EXISTS candidates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id INTEGER NOT NULL,
            name TEXT,
            email TEXT,
            mobile TEXT,
            status TEXT,
            notes TEXT,
            summary TEXT,
            match_score REAL,
            resume_text TEXT,
            interview_date TEXT,
            transcript TEXT,
            job_description TEXT,
            matching_skills TEXT,
            missing_skills TEXT,
            sheet_row_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Insurance customers and their policies
        CREATE TABLE IF NOT EXISTS insurance_customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id INTEGER NOT NULL,
            name TEXT,
            email TEXT,
            mobile TEXT,
            status TEXT,
            notes TEXT,
            product TEXT,
            vertical TEXT,
            policy_no TEXT,
            company TEXT,
            registration_no TEXT,
            premium REAL,
            last_year_premium REAL,
            premium_mode TEXT,
            renewal_date TEXT,
            od_expiry_date TEXT,
            tp_expiry_date TEXT,
            activated_date TEXT,
            thank_you_sent TEXT,
            cheque_hold TEXT,
            payment_date TEXT,
            cheque_no TEXT,
            cheque_bounce TEXT,
            new_policy_no TEXT,
            new_company TEXT,
            policy_doc_link TEXT,
            owner_alert_sent TEXT,
            reason TEXT,
            sheet_row_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- One row per pull/push call, failures included
        CREATE TABLE IF NOT EXISTS sync_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id INTEGER NOT NULL,
            direction TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            imported INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            exported INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            failure TEXT
        );

        -- Tenant scoping
        CREATE INDEX IF NOT EXISTS idx_candidates_tenant ON candidates(tenant_id);
        CREATE INDEX IF NOT EXISTS idx_insurance_customers_tenant ON insurance_customers(tenant_id);

        -- Matcher lookups
        CREATE INDEX IF NOT EXISTS idx_candidates_sheet_row ON candidates(tenant_id, sheet_row_id);
        CREATE INDEX IF NOT EXISTS idx_candidates_email ON candidates(tenant_id, email);
        CREATE INDEX IF NOT EXISTS idx_insurance_customers_sheet_row ON insurance_customers(tenant_id, sheet_row_id);
        CREATE INDEX IF NOT EXISTS idx_insurance_customers_email ON insurance_customers(tenant_id, email);

        -- Latest run per tenant
        CREATE INDEX IF NOT EXISTS idx_sync_runs_tenant ON sync_runs(tenant_id, finished_at);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordKind;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        conn.prepare(&format!("PRAGMA table_info({})", table))
            .unwrap()
            .query_map([], |row| row.get(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"candidates".to_string()));
        assert!(tables.contains(&"insurance_customers".to_string()));
        assert!(tables.contains(&"sync_runs".to_string()));
    }

    #[test]
    fn test_every_field_has_a_column() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for kind in [RecordKind::Candidate, RecordKind::InsuranceCustomer] {
            let cols = columns(&conn, kind.table());
            for field in kind.fields() {
                assert!(cols.contains(&field.key().to_string()), "{} lacks {}", kind.table(), field);
            }
            assert!(cols.contains(&"sheet_row_id".to_string()));
        }
    }

    #[test]
    fn test_name_is_nullable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for kind in [RecordKind::Candidate, RecordKind::InsuranceCustomer] {
            let not_null: bool = conn
                .query_row(
                    &format!("SELECT \"notnull\" FROM pragma_table_info('{}') WHERE name = 'name'", kind.table()),
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(!not_null, "{}.name must accept email-only records", kind.table());
        }
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));
        init_schema(&conn).unwrap();
        assert!(!needs_init(&conn));
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }
}
