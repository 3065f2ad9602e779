//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)
//!
//! Sync outcomes are relayed verbatim. Human output keeps "completed with
//! N skipped rows" apart from "sync failed, nothing changed".

use sheetsync_core::{PushResult, SyncError, SyncResult, SyncRun, TenantId, TenantSchema};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the outcome of a pull
    pub fn print_sync_result(&self, tenant: TenantId, result: &SyncResult) {
        match self.format {
            OutputFormat::Human => {
                println!("{}", sync_summary(result));
                println!(
                    "  imported: {}  updated: {}  deleted: {}  skipped: {}",
                    result.imported, result.updated, result.deleted, result.skipped
                );
                for error in &result.errors {
                    println!("  {}: {}", error.row_id, error.reason);
                }
                for warning in &result.warnings {
                    println!("⚠ {}", warning);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "completed",
                        "tenant": tenant,
                        "result": result
                    })
                );
            }
            OutputFormat::Quiet => {
                println!(
                    "{} {} {} {}",
                    result.imported, result.updated, result.deleted, result.skipped
                );
            }
        }
    }

    /// Print the outcome of a push
    pub fn print_push_result(&self, tenant: TenantId, result: &PushResult) {
        match self.format {
            OutputFormat::Human => {
                println!("✓ Push complete: {} row(s) exported", result.exported);
                if result.cleared_rows > 0 {
                    println!("  cleared {} stale row(s)", result.cleared_rows);
                }
                for warning in &result.warnings {
                    println!("⚠ {}", warning);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "completed",
                        "tenant": tenant,
                        "result": result
                    })
                );
            }
            OutputFormat::Quiet => println!("{}", result.exported),
        }
    }

    /// Print a failed sync call
    pub fn print_sync_error(&self, tenant: TenantId, err: &SyncError) {
        match self.format {
            OutputFormat::Human | OutputFormat::Quiet => {
                eprintln!("✗ Sync failed, nothing changed: {}", err);
                if let Some(suggestion) = err.recovery_suggestion() {
                    if self.format == OutputFormat::Human {
                        eprintln!("  {}", suggestion);
                    }
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "failed",
                        "tenant": tenant,
                        "error": err.to_string(),
                        "retryable": err.is_retryable(),
                        "suggestion": err.recovery_suggestion()
                    })
                );
            }
        }
    }

    /// Print a tenant's status banner
    pub fn print_status(&self, schema: &TenantSchema, record_count: usize, runs: &[SyncRun]) {
        match self.format {
            OutputFormat::Human => {
                println!("{} (tenant {})", schema.name, schema.tenant_id);
                println!("  kind:    {}", schema.kind);
                println!("  records: {}", record_count);
                if runs.is_empty() {
                    println!("  never synced");
                }
                for run in runs {
                    println!("  {}", run_line(run));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "tenant": schema.tenant_id,
                        "name": schema.name,
                        "kind": schema.kind,
                        "records": record_count,
                        "runs": runs
                    })
                );
            }
            OutputFormat::Quiet => {
                let last = runs.first().map(|r| if r.succeeded() { "ok" } else { "failed" });
                println!("{} {}", record_count, last.unwrap_or("never"));
            }
        }
    }

    /// Print the configured tenants
    pub fn print_tenants(&self, tenants: &[&TenantSchema]) {
        match self.format {
            OutputFormat::Human => {
                if tenants.is_empty() {
                    println!("No tenants configured.");
                    return;
                }
                for t in tenants {
                    println!(
                        "{:>4} | {} | {} | {}{}",
                        t.tenant_id,
                        truncate(&t.name, 30),
                        t.kind,
                        t.tab_name.as_deref().unwrap_or("(no tab)"),
                        if t.auto_sync { " | auto" } else { "" }
                    );
                }
                println!("\n{} tenant(s)", tenants.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!(tenants));
            }
            OutputFormat::Quiet => {
                for t in tenants {
                    println!("{}", t.tenant_id);
                }
            }
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an error that stopped the command
    pub fn error(&self, msg: &str) {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "error", "message": msg}));
            }
            _ => eprintln!("Error: {}", msg),
        }
    }
}

/// One-line headline for a completed pull
fn sync_summary(result: &SyncResult) -> String {
    if result.skipped > 0 {
        format!("✓ Sync completed with {} skipped row(s)", result.skipped)
    } else if !result.errors.is_empty() {
        format!("✓ Sync completed with {} row error(s)", result.errors.len())
    } else if result.has_changes() {
        "✓ Sync complete".to_string()
    } else {
        "✓ Sync complete - already up to date".to_string()
    }
}

fn run_line(run: &SyncRun) -> String {
    let when = run.finished_at.format("%Y-%m-%d %H:%M");
    match &run.failure {
        Some(failure) => format!("{} {} failed: {}", when, run.direction, failure),
        None => format!(
            "{} {} ok: +{} ~{} -{} skipped {} exported {}",
            when, run.direction, run.imported, run.updated, run.deleted, run.skipped, run.exported
        ),
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
