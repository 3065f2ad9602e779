//! Tenants command handler

use sheetsync_core::TenantRegistry;

use crate::output::Output;

/// List every configured tenant
pub fn list(registry: &TenantRegistry, output: &Output) {
    let tenants: Vec<_> = registry.tenants().collect();
    output.print_tenants(&tenants);
}
