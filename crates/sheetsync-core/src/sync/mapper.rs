//! Schema Mapper
//!
//! Projects raw sheet rows through a tenant schema into `CanonicalRecord`s.
//! The header lookup is built once per sync call; each row is then mapped
//! by column position.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::{RowIssue, SyncError, SyncOutcome};
use crate::models::{CanonicalField, CanonicalRecord, FieldMap, FieldValue, IdentityBundle, SourceRow};
use crate::sheets::SheetData;
use crate::tenant::{normalize_header, ColumnMapping, TenantSchema};

/// Header positions resolved against a tenant schema
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    /// Live column position of each mapped field
    positions: BTreeMap<CanonicalField, usize>,
    /// Unmapped, non-empty headers with their positions
    extras: Vec<(usize, String)>,
    /// Schema columns absent from the live header row
    missing: Vec<ColumnMapping>,
    /// Live headers that occur more than once; the first one wins
    duplicates: Vec<String>,
}

impl HeaderIndex {
    /// Resolve each schema column to its live position
    pub fn build(headers: &[String], schema: &TenantSchema) -> Self {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut duplicates = Vec::new();
        for (pos, header) in headers.iter().enumerate() {
            let key = normalize_header(header);
            if key.is_empty() {
                continue;
            }
            if by_name.contains_key(&key) {
                duplicates.push(header.trim().to_string());
            } else {
                by_name.insert(key, pos);
            }
        }

        let mut positions = BTreeMap::new();
        let mut missing = Vec::new();
        for column in &schema.columns {
            match by_name.get(&normalize_header(&column.header)) {
                Some(&pos) => {
                    positions.insert(column.field, pos);
                }
                None => missing.push(column.clone()),
            }
        }

        let claimed: BTreeSet<usize> = positions.values().copied().collect();
        let extras = headers
            .iter()
            .enumerate()
            .filter(|(pos, h)| !claimed.contains(pos) && !h.trim().is_empty())
            .map(|(pos, h)| (pos, h.trim().to_string()))
            .collect();

        Self {
            positions,
            extras,
            missing,
            duplicates,
        }
    }

    /// Live column of a field, if the sheet has it
    pub fn position(&self, field: CanonicalField) -> Option<usize> {
        self.positions.get(&field).copied()
    }

    /// Fields whose column is present in the live sheet
    pub fn present_fields(&self) -> BTreeSet<CanonicalField> {
        self.positions.keys().copied().collect()
    }

    /// Schema columns the live sheet lacks
    pub fn missing(&self) -> &[ColumnMapping] {
        &self.missing
    }

    /// Whether the live header can identify rows at all
    pub fn can_identify(&self) -> bool {
        self.positions.contains_key(&CanonicalField::Email)
            || (self.positions.contains_key(&CanonicalField::Mobile)
                && self.positions.contains_key(&CanonicalField::Name))
    }

    /// Human-readable warnings about the live header row
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .missing
            .iter()
            .map(|c| format!("column '{}' ({}) not found in sheet header", c.header, c.field))
            .collect();
        warnings.extend(
            self.duplicates
                .iter()
                .map(|h| format!("header '{}' appears more than once; using the first", h)),
        );
        warnings
    }
}

/// Outcome of mapping one row
#[derive(Debug, Clone, PartialEq)]
pub enum RowMapping {
    /// Every mapped cell is empty; the row is ignored
    Blank,
    /// The row has data but no usable identity
    Unidentified,
    /// A canonical record plus any per-field problems
    Record {
        record: CanonicalRecord,
        issues: Vec<RowIssue>,
    },
}

/// Map one source row through the header index
pub fn map_row(index: &HeaderIndex, row: &SourceRow, schema: &TenantSchema) -> RowMapping {
    let mut fields = FieldMap::new();
    let mut rejected = BTreeSet::new();
    let mut issues = Vec::new();
    let mut has_data = false;

    for (field, pos) in &index.positions {
        let raw = row.cell(*pos);
        if raw.trim().is_empty() {
            continue;
        }
        has_data = true;
        match FieldValue::parse(*field, raw) {
            Ok(Some(value)) => {
                fields.insert(*field, value);
            }
            Ok(None) => {}
            Err(issue) => {
                rejected.insert(*field);
                issues.push(issue);
            }
        }
    }

    if !has_data {
        return RowMapping::Blank;
    }

    let identity = IdentityBundle::from_fields(row.row_id(), &fields);
    if !identity.is_usable() {
        return RowMapping::Unidentified;
    }

    if index.positions.contains_key(&CanonicalField::Status) && !fields.contains_key(&CanonicalField::Status) {
        if let Some(status) = schema.default_status() {
            fields.insert(CanonicalField::Status, FieldValue::Text(status));
        }
    }

    let extras = index
        .extras
        .iter()
        .filter_map(|(pos, header)| {
            let cell = row.cell(*pos).trim();
            (!cell.is_empty()).then(|| (header.clone(), cell.to_string()))
        })
        .collect();

    RowMapping::Record {
        record: CanonicalRecord {
            row_id: row.row_id(),
            sheet_row: row.sheet_row(),
            fields,
            extras,
            identity,
            rejected,
        },
        issues,
    }
}

/// A whole sheet after mapping
#[derive(Debug, Clone, Default)]
pub struct MappedSheet {
    /// Identified records in row order
    pub records: Vec<CanonicalRecord>,
    /// Row ids dropped for lack of identity
    pub unidentified: Vec<String>,
    /// Per-field problems, keyed by row id
    pub issues: Vec<(String, RowIssue)>,
    /// Schema warnings not tied to a row
    pub warnings: Vec<String>,
    /// Fields whose column exists in the live sheet
    pub present: BTreeSet<CanonicalField>,
}

/// Map every data row of a sheet
///
/// Fails only when the sheet has data rows but its header row offers no
/// identity column; every row would be dropped and every stored record
/// would look deleted.
pub fn map_sheet(data: &SheetData, schema: &TenantSchema) -> SyncOutcome<MappedSheet> {
    let index = HeaderIndex::build(&data.headers, schema);
    let warnings = index.warnings();
    for warning in &warnings {
        warn!(tenant = %schema.tenant_id, "{}", warning);
    }

    if !data.rows.is_empty() && !index.can_identify() {
        return Err(SyncError::InvalidSchema(format!(
            "tenant {}: sheet header has no email column and no mobile + name columns",
            schema.tenant_id
        )));
    }

    let mut mapped = MappedSheet {
        warnings,
        present: index.present_fields(),
        ..Default::default()
    };

    for row in data.source_rows() {
        match map_row(&index, &row, schema) {
            RowMapping::Blank => {}
            RowMapping::Unidentified => {
                debug!(row_id = %row.row_id(), "Row has no usable identity");
                mapped.unidentified.push(row.row_id());
            }
            RowMapping::Record { record, issues } => {
                for issue in issues {
                    debug!(row_id = %record.row_id, "{}", issue);
                    mapped.issues.push((record.row_id.clone(), issue));
                }
                mapped.records.push(record);
            }
        }
    }

    Ok(mapped)
}
