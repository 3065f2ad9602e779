//! Sync engine
//!
//! One pull is a linear pipeline with an error channel per stage:
//!
//! - `mapper`: raw rows → `CanonicalRecord`s through the tenant schema
//! - `matcher`: canonical rows ↔ stored records (row id, email, mobile + name)
//! - `applier`: inserts, updates and deletes inside one transaction
//!
//! A push goes the other way: `push` plans range updates from the stored
//! records and the engine writes them. `engine` holds the entry points,
//! `locks` the per-tenant exclusion, and `auto` the periodic trigger.

pub mod applier;
pub mod auto;
pub mod engine;
pub mod locks;
pub mod mapper;
pub mod matcher;
pub mod push;

pub use auto::{spawn_auto_sync, AutoSyncCommand, AutoSyncEvent, AutoSyncHandle, AutoSyncStatus};
pub use engine::SyncEngine;
pub use locks::{TenantLockGuard, TenantLocks};
pub use mapper::{map_row, map_sheet, HeaderIndex, MappedSheet, RowMapping};
pub use matcher::{match_records, MatchOutcome, MatchStrategy};
pub use push::{plan_push, PushPlan};
