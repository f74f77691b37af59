//! Vote command handler

use anyhow::{bail, Context, Result};

use pollsync_core::{Config, SyncEngine};

use crate::output::{Output, OutputFormat};

/// Load the current poll, vote for one option and print the result
pub async fn run(config: &Config, option_id: &str, output: &Output) -> Result<()> {
    let engine = SyncEngine::from_config(config).context("Failed to start the sync engine")?;

    let loaded = engine.wait_until_loaded().await;
    if let Some(error) = loaded.error {
        engine.shutdown().await;
        bail!("Could not load the poll: {}", error);
    }

    let outcome = engine.submit_vote(option_id).await;
    let state = engine.state();
    engine.shutdown().await;

    if !outcome.is_accepted() {
        if output.format == OutputFormat::Json {
            output.print_outcome(&outcome);
        }
        bail!("{}", outcome);
    }
    output.print_outcome(&outcome);

    if output.format == OutputFormat::Human {
        if let Some(ref poll) = state.poll {
            println!();
            output.print_poll(poll, state.has_voted);
        }
    }

    Ok(())
}
