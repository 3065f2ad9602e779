//! Spreadsheet access
//!
//! Isolates the sync engine from the concrete spreadsheet provider.
//!
//! ## Providers
//!
//! - `GoogleSheetsClient`: authenticated Sheets v4 REST API (read + write)
//! - `CsvExportClient`: public CSV export of a shared sheet (read-only)
//! - `MemorySheets`: in-memory grids for tests and dry runs
//!
//! `SpreadsheetReader` wraps a provider with the retry policy and the
//! optional CSV fallback.

use async_trait::async_trait;

use crate::error::SyncOutcome;
use crate::models::SourceRow;

pub mod csv_export;
pub mod google;
pub mod memory;
pub mod reader;
pub mod retry;

pub use csv_export::CsvExportClient;
pub use google::GoogleSheetsClient;
pub use memory::MemorySheets;
pub use reader::SpreadsheetReader;
pub use retry::RetryPolicy;

/// A spreadsheet backend scoped by spreadsheet id + tab name
#[async_trait]
pub trait SheetsProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Read every populated row of a tab, header row included
    ///
    /// An empty tab yields an empty grid, not an error.
    async fn read_values(&self, spreadsheet_id: &str, tab: &str) -> SyncOutcome<Vec<Vec<String>>>;

    /// Write a batch of rectangular ranges in one request
    async fn write_values(
        &self,
        spreadsheet_id: &str,
        tab: &str,
        updates: &[RangeUpdate],
    ) -> SyncOutcome<()>;
}

/// Header and data rows of one tab
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetData {
    /// Split a raw grid into header row and data rows
    pub fn from_grid(mut grid: Vec<Vec<String>>) -> Self {
        if grid.is_empty() {
            return Self::default();
        }
        let rows = grid.split_off(1);
        let headers = grid.pop().unwrap_or_default();
        Self { headers, rows }
    }

    /// Data rows with their positional index
    pub fn source_rows(&self) -> Vec<SourceRow> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, cells)| SourceRow::new(i + 1, cells.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

/// A rectangular block of values to write
#[derive(Debug, Clone, PartialEq)]
pub struct RangeUpdate {
    /// 1-based sheet row of the first value row
    pub start_row: usize,
    /// 0-based column of the first value
    pub start_column: usize,
    /// Row-major values; every row has the same width
    pub values: Vec<Vec<String>>,
}

impl RangeUpdate {
    pub fn width(&self) -> usize {
        self.values.first().map(Vec::len).unwrap_or(0)
    }

    /// Last 1-based row covered
    pub fn end_row(&self) -> usize {
        self.start_row + self.values.len().saturating_sub(1)
    }

    /// Last 0-based column covered
    pub fn end_column(&self) -> usize {
        self.start_column + self.width().saturating_sub(1)
    }

    /// A1 notation for this block, e.g. `'Sheet 1'!B2:D10`
    pub fn a1(&self, tab: &str) -> String {
        format!(
            "{}!{}{}:{}{}",
            quote_tab(tab),
            column_letter(self.start_column),
            self.start_row,
            column_letter(self.end_column()),
            self.end_row()
        )
    }
}

/// Column letters for a 0-based index (0 → A, 26 → AA)
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Quote a tab name for A1 notation
pub fn quote_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

/// Extract the spreadsheet id from a sheet URL
///
/// Anything that is not a `/spreadsheets/d/<id>` URL is returned trimmed,
/// so plain ids pass through unchanged.
pub fn spreadsheet_id_from_url(input: &str) -> String {
    let input = input.trim();
    match input.split_once("/spreadsheets/d/") {
        Some((_, rest)) => rest
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .next()
            .unwrap_or(rest)
            .to_string(),
        None => input.to_string(),
    }
}
