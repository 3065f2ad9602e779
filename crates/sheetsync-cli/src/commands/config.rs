//! Config command handler

use std::path::Path;

use anyhow::Result;

use sheetsync_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the effective configuration
pub fn show(config: &Config, config_path: Option<&Path>, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::config_file_path);
            let token_set = std::env::var(&config.access_token_env).is_ok_and(|t| !t.is_empty());

            println!("Configuration:");
            println!("  data_dir:                {}", config.data_dir.display());
            println!("  tenants_file:            {}", config.tenants_file.display());
            println!("  sheets_api_url:          {}", config.sheets_api_url);
            println!(
                "  access_token_env:        {} ({})",
                config.access_token_env,
                if token_set { "set" } else { "not set" }
            );
            println!("  csv_fallback:            {}", config.csv_fallback);
            println!("  request_timeout_secs:    {}", config.request_timeout_secs);
            println!("  retry_attempts:          {}", config.retry_attempts);
            println!("  retry_base_ms:           {}", config.retry_base_ms);
            println!("  auto_sync_interval_secs: {}", config.auto_sync_interval_secs);
            println!(
                "  log_file:                {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
            println!("Database:    {}", config.database_path().display());
        }
    }

    Ok(())
}
