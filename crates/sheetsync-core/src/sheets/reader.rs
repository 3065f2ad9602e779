//! Spreadsheet Reader
//!
//! Wraps a provider with the retry policy and the optional read-only
//! fallback used when the primary provider rejects our credentials.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::csv_export::CsvExportClient;
use super::google::GoogleSheetsClient;
use super::retry::{with_retry, RetryPolicy};
use super::{RangeUpdate, SheetData, SheetsProvider};
use crate::config::Config;
use crate::error::{SyncError, SyncOutcome};

/// Reads and writes tabs through a primary provider
#[derive(Clone)]
pub struct SpreadsheetReader {
    primary: Arc<dyn SheetsProvider>,
    fallback: Option<Arc<dyn SheetsProvider>>,
    policy: RetryPolicy,
}

impl SpreadsheetReader {
    pub fn new(primary: Arc<dyn SheetsProvider>) -> Self {
        Self {
            primary,
            fallback: None,
            policy: RetryPolicy::default(),
        }
    }

    /// Read through `fallback` when the primary answers with an auth error
    pub fn with_fallback(mut self, fallback: Arc<dyn SheetsProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the Sheets API reader (plus CSV fallback if enabled) from config
    pub fn from_config(config: &Config) -> SyncOutcome<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let token = std::env::var(&config.access_token_env).ok();
        if token.is_none() {
            debug!(var = %config.access_token_env, "No Sheets access token in environment");
        }

        let primary = GoogleSheetsClient::new(&config.sheets_api_url, token, timeout)?;
        let mut reader = Self::new(Arc::new(primary)).with_policy(RetryPolicy::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_base_ms),
        ));

        if config.csv_fallback {
            reader = reader.with_fallback(Arc::new(CsvExportClient::new(timeout)?));
        }

        Ok(reader)
    }

    /// Fetch header and data rows of a tab
    ///
    /// An empty tab yields empty headers and rows.
    pub async fn read_sheet(&self, spreadsheet_id: &str, tab: &str) -> SyncOutcome<SheetData> {
        let grid = match self.read_with(&self.primary, spreadsheet_id, tab).await {
            Ok(grid) => grid,
            Err(SyncError::Auth(reason)) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        spreadsheet_id,
                        tab,
                        primary = self.primary.name(),
                        fallback = fallback.name(),
                        "Primary provider denied access ({}), falling back",
                        reason
                    );
                    self.read_with(fallback, spreadsheet_id, tab).await?
                }
                None => return Err(SyncError::Auth(reason)),
            },
            Err(e) => return Err(e),
        };

        let data = SheetData::from_grid(grid);
        debug!(
            spreadsheet_id,
            tab,
            headers = data.headers.len(),
            rows = data.rows.len(),
            "Read sheet"
        );
        Ok(data)
    }

    /// Write ranges through the primary provider
    pub async fn write(&self, spreadsheet_id: &str, tab: &str, updates: &[RangeUpdate]) -> SyncOutcome<()> {
        let operation = format!("write {}", self.primary.name());
        with_retry(&self.policy, &operation, || {
            self.primary.write_values(spreadsheet_id, tab, updates)
        })
        .await
    }

    async fn read_with(
        &self,
        provider: &Arc<dyn SheetsProvider>,
        spreadsheet_id: &str,
        tab: &str,
    ) -> SyncOutcome<Vec<Vec<String>>> {
        let operation = format!("read {}", provider.name());
        with_retry(&self.policy, &operation, || provider.read_values(spreadsheet_id, tab)).await
    }
}
