//! Google Sheets v4 REST client
//!
//! Reads a whole tab with `values.get` and writes with one
//! `values:batchUpdate` request. Authentication is a bearer token supplied
//! by the caller (obtaining it is outside this crate).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{quote_tab, RangeUpdate, SheetsProvider};
use crate::error::{SyncError, SyncOutcome};

/// Default API root
pub const DEFAULT_API_URL: &str = "https://sheets.googleapis.com/v4";

/// Authenticated Sheets API client
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleSheetsClient {
    /// Create a client; every request carries `timeout`
    pub fn new(base_url: &str, access_token: Option<String>, timeout: Duration) -> SyncOutcome<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Whether a token is available at all
    pub fn has_credentials(&self) -> bool {
        self.access_token.is_some()
    }

    fn token(&self) -> SyncOutcome<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| SyncError::Auth("no Google Sheets access token configured".to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> SyncOutcome<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::Provider(format!("invalid Sheets API URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::Provider(format!("invalid Sheets API URL {}", self.base_url)))?
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl SheetsProvider for GoogleSheetsClient {
    fn name(&self) -> &'static str {
        "google-sheets"
    }

    async fn read_values(&self, spreadsheet_id: &str, tab: &str) -> SyncOutcome<Vec<Vec<String>>> {
        let token = self.token()?;
        let range = quote_tab(tab);
        let url = self.endpoint(&["spreadsheets", spreadsheet_id, "values", &range])?;

        debug!(spreadsheet_id, tab, "Reading sheet values");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("majorDimension", "ROWS"), ("valueRenderOption", "FORMATTED_VALUE")])
            .send()
            .await
            .map_err(from_reqwest)?;

        let response = check_status(response, spreadsheet_id, tab).await?;
        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("unexpected values response: {}", e)))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        tab: &str,
        updates: &[RangeUpdate],
    ) -> SyncOutcome<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let token = self.token()?;
        let url = self.endpoint(&["spreadsheets", spreadsheet_id, "values:batchUpdate"])?;

        let data: Vec<_> = updates
            .iter()
            .map(|u| {
                json!({
                    "range": u.a1(tab),
                    "majorDimension": "ROWS",
                    "values": u.values,
                })
            })
            .collect();

        debug!(spreadsheet_id, tab, ranges = updates.len(), "Writing sheet values");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "valueInputOption": "RAW", "data": data }))
            .send()
            .await
            .map_err(from_reqwest)?;

        check_status(response, spreadsheet_id, tab).await?;
        Ok(())
    }
}

async fn check_status(
    response: reqwest::Response,
    spreadsheet_id: &str,
    tab: &str,
) -> SyncOutcome<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    Err(classify_status(status, &body, retry_after, spreadsheet_id, tab))
}

/// Map an HTTP failure onto the engine's error kinds
fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
    spreadsheet_id: &str,
    tab: &str,
) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SyncError::Auth(format!("HTTP {} for spreadsheet {}", status.as_u16(), spreadsheet_id))
        }
        StatusCode::NOT_FOUND => SyncError::NotFound(format!("spreadsheet {}", spreadsheet_id)),
        // The API reports a missing tab as an unparsable range
        StatusCode::BAD_REQUEST if body.contains("Unable to parse range") => {
            SyncError::NotFound(format!("tab '{}' in spreadsheet {}", tab, spreadsheet_id))
        }
        StatusCode::TOO_MANY_REQUESTS => SyncError::Transient {
            message: "rate limited by Sheets API".to_string(),
            retry_after,
        },
        s if s.is_server_error() => SyncError::Transient {
            message: format!("Sheets API returned HTTP {}", s.as_u16()),
            retry_after,
        },
        s => SyncError::Provider(format!("HTTP {}: {}", s.as_u16(), truncate(body, 200))),
    }
}

/// Map a transport failure onto the engine's error kinds
pub(crate) fn from_reqwest(err: reqwest::Error) -> SyncError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        SyncError::transient(err.to_string())
    } else {
        SyncError::Provider(err.to_string())
    }
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
