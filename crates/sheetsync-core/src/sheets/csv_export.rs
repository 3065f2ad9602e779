//! Public CSV export reader
//!
//! Sheets shared as "anyone with the link" can be read without credentials
//! through the gviz CSV export. This path is read-only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::google::from_reqwest;
use super::{RangeUpdate, SheetsProvider};
use crate::error::{SyncError, SyncOutcome};

const EXPORT_BASE_URL: &str = "https://docs.google.com/spreadsheets/d";

/// Unauthenticated CSV export client
pub struct CsvExportClient {
    client: Client,
    base_url: String,
}

impl CsvExportClient {
    pub fn new(timeout: Duration) -> SyncOutcome<Self> {
        Self::with_base_url(EXPORT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> SyncOutcome<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn export_url(&self, spreadsheet_id: &str) -> String {
        format!("{}/{}/gviz/tq", self.base_url, spreadsheet_id)
    }
}

#[async_trait]
impl SheetsProvider for CsvExportClient {
    fn name(&self) -> &'static str {
        "csv-export"
    }

    async fn read_values(&self, spreadsheet_id: &str, tab: &str) -> SyncOutcome<Vec<Vec<String>>> {
        debug!(spreadsheet_id, tab, "Reading sheet via CSV export");

        let response = self
            .client
            .get(self.export_url(spreadsheet_id))
            .query(&[("tqx", "out:csv"), ("sheet", tab)])
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SyncError::Auth(format!(
                    "spreadsheet {} is not publicly shared",
                    spreadsheet_id
                )))
            }
            StatusCode::NOT_FOUND => {
                return Err(SyncError::NotFound(format!("spreadsheet {}", spreadsheet_id)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(SyncError::transient("rate limited by CSV export"))
            }
            s if s.is_server_error() => {
                return Err(SyncError::transient(format!("CSV export returned HTTP {}", s.as_u16())))
            }
            s => return Err(SyncError::Provider(format!("CSV export returned HTTP {}", s.as_u16()))),
        }

        let body = response.text().await.map_err(from_reqwest)?;
        parse_export(&body, spreadsheet_id)
    }

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        _tab: &str,
        _updates: &[RangeUpdate],
    ) -> SyncOutcome<()> {
        Err(SyncError::Auth(format!(
            "CSV export of spreadsheet {} is read-only",
            spreadsheet_id
        )))
    }
}

/// Parse an export body into a grid
///
/// A private sheet answers with the Google sign-in page instead of CSV.
fn parse_export(body: &str, spreadsheet_id: &str) -> SyncOutcome<Vec<Vec<String>>> {
    let head = body.trim_start();
    if head.starts_with("<!DOCTYPE") || head.starts_with("<html") {
        return Err(SyncError::Auth(format!(
            "spreadsheet {} is not publicly shared",
            spreadsheet_id
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SyncError::Provider(format!("malformed CSV export: {}", e)))?;
        let mut row: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        while row.last().is_some_and(|c| c.is_empty()) {
            row.pop();
        }
        grid.push(row);
    }

    // The export pads trailing blank rows; drop them like the API does
    while grid.last().is_some_and(|r| r.is_empty()) {
        grid.pop();
    }

    Ok(grid)
}
