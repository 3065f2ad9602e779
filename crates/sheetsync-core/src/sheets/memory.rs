//! In-memory spreadsheet provider
//!
//! Holds grids keyed by (spreadsheet id, tab). Used by tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{RangeUpdate, SheetsProvider};
use crate::error::{SyncError, SyncOutcome};

type Grid = Vec<Vec<String>>;

#[derive(Default)]
struct Inner {
    grids: HashMap<(String, String), Grid>,
    /// Errors returned by the next calls, in order
    failures: VecDeque<SyncError>,
    reads: usize,
    writes: usize,
}

/// Shared in-memory spreadsheets; clones see the same data
#[derive(Clone, Default)]
pub struct MemorySheets {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned test fixture is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace a tab's contents
    pub fn set_grid(&self, spreadsheet_id: &str, tab: &str, grid: Grid) {
        self.lock()
            .grids
            .insert((spreadsheet_id.to_string(), tab.to_string()), grid);
    }

    /// Convenience wrapper over `set_grid` for string literals
    pub fn set_rows(&self, spreadsheet_id: &str, tab: &str, rows: &[&[&str]]) {
        let grid = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        self.set_grid(spreadsheet_id, tab, grid);
    }

    /// Current contents of a tab
    pub fn grid(&self, spreadsheet_id: &str, tab: &str) -> Option<Grid> {
        self.lock()
            .grids
            .get(&(spreadsheet_id.to_string(), tab.to_string()))
            .cloned()
    }

    /// Make the next call fail with `err`
    pub fn fail_next(&self, err: SyncError) {
        self.lock().failures.push_back(err);
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes
    }
}

fn not_found(spreadsheet_id: &str, tab: &str) -> SyncError {
    SyncError::NotFound(format!("tab '{}' in spreadsheet {}", tab, spreadsheet_id))
}

#[async_trait]
impl SheetsProvider for MemorySheets {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read_values(&self, spreadsheet_id: &str, tab: &str) -> SyncOutcome<Vec<Vec<String>>> {
        let mut inner = self.lock();
        inner.reads += 1;
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }

        let mut grid = inner
            .grids
            .get(&(spreadsheet_id.to_string(), tab.to_string()))
            .cloned()
            .ok_or_else(|| not_found(spreadsheet_id, tab))?;

        // Match the API: trailing empty cells and rows are not returned
        for row in grid.iter_mut() {
            while row.last().is_some_and(|c| c.is_empty()) {
                row.pop();
            }
        }
        while grid.last().is_some_and(|r| r.is_empty()) {
            grid.pop();
        }
        Ok(grid)
    }

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        tab: &str,
        updates: &[RangeUpdate],
    ) -> SyncOutcome<()> {
        let mut inner = self.lock();
        inner.writes += 1;
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }

        let grid = inner
            .grids
            .get_mut(&(spreadsheet_id.to_string(), tab.to_string()))
            .ok_or_else(|| not_found(spreadsheet_id, tab))?;

        for update in updates {
            if update.start_row == 0 {
                return Err(SyncError::Provider("row numbers start at 1".to_string()));
            }
            for (offset, values) in update.values.iter().enumerate() {
                let row_idx = update.start_row - 1 + offset;
                if grid.len() <= row_idx {
                    grid.resize(row_idx + 1, Vec::new());
                }
                let row = &mut grid[row_idx];
                let needed = update.start_column + values.len();
                if row.len() < needed {
                    row.resize(needed, String::new());
                }
                for (col_offset, value) in values.iter().enumerate() {
                    row[update.start_column + col_offset] = value.clone();
                }
            }
        }

        Ok(())
    }
}
