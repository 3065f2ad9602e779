//! Error handling
//!
//! Two layers of failure:
//!
//! - `SyncError`: systemic failures that abort a whole sync call. No partial
//!   `SyncResult` is returned when one of these surfaces.
//! - `RowIssue`: per-row problems that are recovered locally and folded into
//!   `SyncResult::errors` / `SyncResult::skipped`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::models::{CanonicalField, TenantId};
use crate::sheets::retry::{RetryDecision, RetryableError};

/// Errors that abort a sync call
#[derive(Error, Debug)]
pub enum SyncError {
    /// Credentials cannot access the spreadsheet
    #[error("Spreadsheet access denied: {0}")]
    Auth(String),

    /// Spreadsheet or tab does not exist
    #[error("Spreadsheet or tab not found: {0}")]
    NotFound(String),

    /// Rate limit, timeout or server-side failure; worth retrying
    #[error("Transient spreadsheet error: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Provider rejected the request and retrying will not help
    #[error("Spreadsheet provider rejected the request: {0}")]
    Provider(String),

    /// Another sync for the same tenant is in flight
    #[error("A sync is already running for tenant {0}")]
    SyncInProgress(TenantId),

    /// The transaction could not be committed; nothing was applied
    #[error("Failed to commit sync transaction: {0}")]
    Commit(#[source] rusqlite::Error),

    /// Store failure outside the per-row recovery scope
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No schema is configured for the tenant
    #[error("No tenant configuration for tenant {0}")]
    UnknownTenant(TenantId),

    /// Tenant schema is unusable
    #[error("Invalid tenant schema: {0}")]
    InvalidSchema(String),
}

impl SyncError {
    /// Create a transient error without a server-provided delay
    pub fn transient(message: impl Into<String>) -> Self {
        SyncError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Check if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Auth(_) => {
                Some("Share the spreadsheet with the service account, or refresh the access token.")
            }
            SyncError::NotFound(_) => {
                Some("Check the spreadsheet id and the tab name configured for the tenant.")
            }
            SyncError::Transient { .. } => Some("The spreadsheet service is busy. Try again shortly."),
            SyncError::SyncInProgress(_) => {
                Some("Wait for the running sync to finish, then trigger a new one.")
            }
            SyncError::UnknownTenant(_) | SyncError::InvalidSchema(_) => {
                Some("Fix the tenant entry in tenants.toml.")
            }
            _ => None,
        }
    }
}

impl RetryableError for SyncError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            SyncError::Transient {
                retry_after: Some(delay),
                ..
            } => RetryDecision::RetryAfter(*delay),
            SyncError::Transient { .. } => RetryDecision::Retry,
            _ => RetryDecision::NoRetry,
        }
    }
}

/// Result type for engine operations
pub type SyncOutcome<T> = Result<T, SyncError>;

/// A problem confined to a single row
#[derive(Debug, Clone, PartialEq)]
pub enum RowIssue {
    /// Neither an email nor a mobile + name pair
    MissingIdentity,
    /// Several stored records share the row's mobile + name
    AmbiguousDuplicate { kept: i64, others: Vec<i64> },
    /// A typed cell could not be parsed; the field was skipped
    InvalidValue { field: CanonicalField, raw: String },
    /// The store rejected the row
    Constraint(String),
}

impl RowIssue {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RowIssue::MissingIdentity => "missing_identity",
            RowIssue::AmbiguousDuplicate { .. } => "ambiguous_duplicate",
            RowIssue::InvalidValue { .. } => "invalid_value",
            RowIssue::Constraint(_) => "constraint_violation",
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::MissingIdentity => f.write_str(self.code()),
            RowIssue::AmbiguousDuplicate { kept, others } => {
                let others: Vec<String> = others.iter().map(i64::to_string).collect();
                write!(f, "{}: kept {}, left {}", self.code(), kept, others.join(","))
            }
            RowIssue::InvalidValue { field, raw } => {
                write!(f, "{}: {} = {:?}", self.code(), field, raw)
            }
            RowIssue::Constraint(detail) => write!(f, "{}: {}", self.code(), detail),
        }
    }
}

/// Row-level error as reported in `SyncResult::errors`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    #[serde(rename = "rowId")]
    pub row_id: String,
    pub reason: String,
}

impl RowError {
    pub fn new(row_id: impl Into<String>, issue: RowIssue) -> Self {
        Self {
            row_id: row_id.into(),
            reason: issue.to_string(),
        }
    }

    /// Reason code without the detail suffix
    pub fn code(&self) -> &str {
        self.reason.split(':').next().unwrap_or(&self.reason)
    }
}
