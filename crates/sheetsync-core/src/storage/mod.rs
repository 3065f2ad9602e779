//! Storage layer
//!
//! SQLite tables mirroring each tenant's sheet, plus the sync run history.
//!
//! ## Tables
//!
//! - `candidates` - candidate records
//! - `insurance_customers` - insurance customer records
//! - `sync_runs` - one row per pull/push call

pub mod records;
pub mod runs;
pub mod schema;

pub use runs::{SyncDirection, SyncRun};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
