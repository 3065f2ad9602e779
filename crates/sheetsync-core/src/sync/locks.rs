//! Per-tenant mutual exclusion
//!
//! A sync call holds its tenant's lock for its whole duration. A second call
//! for the same tenant is rejected instead of queued; calls for different
//! tenants never contend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{SyncError, SyncOutcome};
use crate::models::TenantId;

/// Set of tenants with a sync in flight
#[derive(Debug, Clone, Default)]
pub struct TenantLocks {
    busy: Arc<Mutex<HashSet<TenantId>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> MutexGuard<'_, HashSet<TenantId>> {
        // The set stays consistent even if a holder panicked
        self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the tenant's lock, failing with `SyncInProgress` if it is held
    pub fn try_acquire(&self, tenant_id: TenantId) -> SyncOutcome<TenantLockGuard> {
        if !self.set().insert(tenant_id) {
            return Err(SyncError::SyncInProgress(tenant_id));
        }
        Ok(TenantLockGuard {
            locks: self.clone(),
            tenant_id,
        })
    }

    pub fn is_locked(&self, tenant_id: TenantId) -> bool {
        self.set().contains(&tenant_id)
    }
}

/// Releases the tenant's lock on drop
#[derive(Debug)]
pub struct TenantLockGuard {
    locks: TenantLocks,
    tenant_id: TenantId,
}

impl TenantLockGuard {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl Drop for TenantLockGuard {
    fn drop(&mut self) {
        self.locks.set().remove(&self.tenant_id);
    }
}
