//! sheetsync core library
//!
//! Keeps a relational mirror of each tenant's spreadsheet. Business staff
//! edit the sheet; the store follows it, and can write its records back.
//!
//! # Architecture
//!
//! - **Spreadsheet**: source of truth, read through `SpreadsheetReader`
//! - **SQLite**: tenant-scoped mirror, owned by `Store`
//! - **SyncEngine**: per-tenant locked pull/push between the two
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let registry = Arc::new(TenantRegistry::load(&config.tenants_file)?);
//! let engine = SyncEngine::new(
//!     Arc::new(Store::open(&config)?),
//!     SpreadsheetReader::from_config(&config)?,
//!     registry,
//! );
//!
//! let result = engine.sync_from_sheet(TenantId(7), "1abc...", "updating_input").await?;
//! ```
//!
//! # Modules
//!
//! - `sync`: mapper, matcher, applier, push planning and the engine
//! - `sheets`: spreadsheet providers, retry and fallback
//! - `store` / `storage`: SQLite schema, tenant-scoped CRUD, run history
//! - `tenant` / `layouts`: tenant schemas and built-in column layouts
//! - `models` / `error`: shared types
//! - `config`: application configuration

pub mod config;
pub mod error;
pub mod layouts;
pub mod models;
pub mod sheets;
pub mod storage;
pub mod store;
pub mod sync;
pub mod tenant;

pub use config::Config;
pub use error::{RowError, RowIssue, SyncError, SyncOutcome};
pub use models::{
    CanonicalField, CanonicalRecord, FieldValue, PersistedRecord, PushResult, RecordKind, SyncResult,
    TenantId,
};
pub use sheets::{SheetsProvider, SpreadsheetReader};
pub use storage::{SyncDirection, SyncRun};
pub use store::Store;
pub use sync::SyncEngine;
pub use tenant::{DeletionPolicy, SchemaSource, TenantRegistry, TenantSchema};
