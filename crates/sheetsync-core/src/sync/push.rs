//! Reverse Push planning
//!
//! Projects stored records back into the tenant's columns. Planning is pure:
//! it takes the live sheet and the records and returns the range updates to
//! write, so placement can be tested without a provider.

use std::collections::BTreeMap;

use tracing::warn;

use super::mapper::HeaderIndex;
use crate::models::{parse_row_id, row_id_for, CanonicalField, PersistedRecord};
use crate::sheets::{RangeUpdate, SheetData};
use crate::tenant::TenantSchema;

/// First sheet row holding data
const FIRST_DATA_ROW: usize = 2;

/// Everything a push will write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPlan {
    pub updates: Vec<RangeUpdate>,
    /// Records written to the sheet
    pub exported: usize,
    /// Rows whose owned cells are blanked
    pub cleared_rows: usize,
    /// Record ids whose `sheet_row_id` changes once the write lands
    pub placements: Vec<(i64, String)>,
    pub warnings: Vec<String>,
}

impl PushPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Plan the write-back of `records` into the live sheet
pub fn plan_push(schema: &TenantSchema, data: &SheetData, records: &[PersistedRecord]) -> PushPlan {
    let mut plan = PushPlan::default();
    let write_header = data.headers.iter().all(|h| h.trim().is_empty());

    // Owned columns at their live positions
    let mut columns: Vec<(usize, CanonicalField)> = if write_header {
        schema.columns.iter().enumerate().map(|(i, c)| (i, c.field)).collect()
    } else {
        let index = HeaderIndex::build(&data.headers, schema);
        for column in index.missing() {
            let warning = format!("column '{}' not found in sheet header; not exported", column.header);
            warn!(tenant = %schema.tenant_id, "{}", warning);
            plan.warnings.push(warning);
        }
        schema
            .columns
            .iter()
            .filter_map(|c| index.position(c.field).map(|pos| (pos, c.field)))
            .collect()
    };
    columns.sort_by_key(|(pos, _)| *pos);

    if write_header {
        plan.updates.push(RangeUpdate {
            start_row: 1,
            start_column: 0,
            values: vec![schema.columns.iter().map(|c| c.header.clone()).collect()],
        });
    }

    if columns.is_empty() {
        return plan;
    }

    let retired = schema.retired_status();
    let mut exportable: Vec<&PersistedRecord> = records
        .iter()
        .filter(|r| retired.is_none() || r.status() != retired.as_deref())
        .collect();
    exportable.sort_by_key(|r| (r.created_at, r.id));

    // Place records on their known row when it is still inside the sheet
    let last_used_row = data.rows.len() + 1;
    let mut placed: BTreeMap<usize, &PersistedRecord> = BTreeMap::new();
    let mut pending = Vec::new();
    for record in exportable {
        let known = record
            .sheet_row_id
            .as_deref()
            .and_then(parse_row_id)
            .filter(|row| *row <= last_used_row && !placed.contains_key(row));
        match known {
            Some(row) => {
                placed.insert(row, record);
            }
            None => pending.push(record),
        }
    }

    let mut next_row = last_used_row.max(FIRST_DATA_ROW - 1) + 1;
    for record in pending {
        placed.insert(next_row, record);
        plan.placements.push((record.id, row_id_for(next_row)));
        next_row += 1;
    }

    let max_row = placed.keys().next_back().copied().unwrap_or(0).max(last_used_row);
    if max_row < FIRST_DATA_ROW {
        return plan;
    }

    // One row of owned cells per sheet row, in column order
    let mut grid: Vec<Vec<String>> = Vec::with_capacity(max_row + 1 - FIRST_DATA_ROW);
    for row in FIRST_DATA_ROW..=max_row {
        match placed.get(&row) {
            Some(record) => grid.push(
                columns
                    .iter()
                    .map(|(_, field)| record.get(*field).map(|v| v.render_for(*field)).unwrap_or_default())
                    .collect(),
            ),
            None => {
                let existing = data.rows.get(row - FIRST_DATA_ROW);
                let had_content = existing.is_some_and(|cells| {
                    columns
                        .iter()
                        .any(|(pos, _)| cells.get(*pos).is_some_and(|c| !c.trim().is_empty()))
                });
                if had_content {
                    plan.cleared_rows += 1;
                }
                grid.push(vec![String::new(); columns.len()]);
            }
        }
    }
    plan.exported = placed.len();

    // Merge adjacent owned columns into one range each
    let mut start = 0;
    while start < columns.len() {
        let mut end = start;
        while end + 1 < columns.len() && columns[end + 1].0 == columns[end].0 + 1 {
            end += 1;
        }
        plan.updates.push(RangeUpdate {
            start_row: FIRST_DATA_ROW,
            start_column: columns[start].0,
            values: grid.iter().map(|cells| cells[start..=end].to_vec()).collect(),
        });
        start = end + 1;
    }

    plan
}
