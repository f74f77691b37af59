//! Show command handler

use anyhow::{Context, Result};

use pollsync_core::{ClientIdentity, Config, HttpPollApi, PollApi};

use crate::output::Output;

/// Fetch the current poll once and print it
pub async fn run(config: &Config, output: &Output) -> Result<()> {
    let api = HttpPollApi::from_config(config).context("Failed to create HTTP client")?;
    let poll = api
        .fetch_current_poll()
        .await
        .context("Failed to fetch the current poll")?;

    let identity = ClientIdentity::new(config);
    output.print_poll(&poll, identity.has_voted(&poll.id));

    Ok(())
}
