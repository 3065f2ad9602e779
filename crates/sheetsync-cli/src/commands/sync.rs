//! Pull and push command handlers

use std::process::ExitCode;

use sheetsync_core::{SyncEngine, SyncOutcome};

use crate::output::Output;
use crate::Target;

/// Spreadsheet id and tab for a target, falling back to the tenant's configuration
fn resolve(engine: &SyncEngine, target: &Target) -> SyncOutcome<(String, String)> {
    if let (Some(id), Some(tab)) = (&target.spreadsheet, &target.tab) {
        return Ok((id.clone(), tab.clone()));
    }

    let schema = engine.schema(target.tenant)?;
    let (configured_id, configured_tab) = schema.target()?;
    Ok((
        target.spreadsheet.clone().unwrap_or_else(|| configured_id.to_string()),
        target.tab.clone().unwrap_or_else(|| configured_tab.to_string()),
    ))
}

/// Pull the tenant's sheet into the store
pub async fn pull(engine: &SyncEngine, target: &Target, output: &Output) -> ExitCode {
    let outcome = match resolve(engine, target) {
        Ok((id, tab)) => engine.sync_from_sheet(target.tenant, &id, &tab).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            output.print_sync_result(target.tenant, &result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            output.print_sync_error(target.tenant, &e);
            ExitCode::FAILURE
        }
    }
}

/// Push the tenant's records back into its sheet
pub async fn push(engine: &SyncEngine, target: &Target, output: &Output) -> ExitCode {
    let outcome = match resolve(engine, target) {
        Ok((id, tab)) => engine.push_to_sheet(target.tenant, &id, &tab).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            output.print_push_result(target.tenant, &result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            output.print_sync_error(target.tenant, &e);
            ExitCode::FAILURE
        }
    }
}
