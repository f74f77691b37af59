//! Status command handler

use anyhow::Result;

use pollsync_core::{ClientIdentity, Config};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(config: &Config, output: &Output) -> Result<()> {
    let identity = ClientIdentity::new(config);
    let token = identity.token();
    let voted = identity.voted_polls();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "client_token": token,
                    "voted_polls": voted,
                    "api_base_url": config.api_base_url,
                    "ws_url": config.ws_url,
                    "poll_room": config.poll_room,
                    "data_dir": config.data_dir
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", token.as_deref().unwrap_or(""));
        }
        OutputFormat::Human => {
            println!("Pollsync Status");
            println!("===============");
            println!();
            println!("Client:");
            println!(
                "  Token: {}",
                token.as_deref().unwrap_or("(created on first vote)")
            );
            println!("  Data:  {}", config.data_dir.display());
            println!();
            println!("Server:");
            println!("  API:       {}", config.api_base_url);
            println!("  Live:      {}", config.ws_url);
            println!("  Poll room: {}", config.poll_room);
            println!(
                "  Reconnect: {} attempts, every {} ms",
                config.reconnect_attempts, config.reconnect_interval_ms
            );
            println!();
            if voted.is_empty() {
                println!("No votes recorded on this device.");
            } else {
                println!("Voted in ({}):", voted.len());
                for poll_id in &voted {
                    println!("  {}", poll_id);
                }
            }
        }
    }

    Ok(())
}
