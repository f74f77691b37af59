//! Config command handlers

use anyhow::{Context, Result};

use pollsync_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&config).context("Failed to serialize configuration")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", Config::config_file_path().display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:                  {}", config.data_dir.display());
            println!("  api_base_url:              {}", config.api_base_url);
            println!("  request_timeout_ms:        {}", config.request_timeout_ms);
            println!("  ws_url:                    {}", config.ws_url);
            println!("  reconnect_attempts:        {}", config.reconnect_attempts);
            println!("  reconnect_interval_ms:     {}", config.reconnect_interval_ms);
            println!(
                "  manual_reconnect_delay_ms: {}",
                config.manual_reconnect_delay_ms
            );
            println!("  poll_room:                 {}", config.poll_room);
            println!("  push_ordering:             {:?}", config.push_ordering);
            println!(
                "  log_file:                  {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: &str, value: &str, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;

    config.set_value(key, value)?;
    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
