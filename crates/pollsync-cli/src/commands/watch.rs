//! Watch command handler
//!
//! Runs the sync engine until `quit` or Ctrl-C, printing every state change
//! and notice. Commands are read line by line from stdin.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use pollsync_core::{Config, SubmitOutcome, SyncEngine};

use crate::output::Output;

const HELP: &str = "Commands: vote <option-id>, refresh, reconnect, quit";

/// A line typed while watching
#[derive(Debug, PartialEq, Eq)]
enum WatchCommand {
    Vote(String),
    Refresh,
    Reconnect,
    Help,
    Quit,
}

/// Parse one input line; blank lines yield `None`
fn parse_command(line: &str) -> Result<Option<WatchCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let parsed = match command {
        "vote" | "v" => match words.next() {
            Some(option_id) => WatchCommand::Vote(option_id.to_string()),
            None => return Err("Usage: vote <option-id>".to_string()),
        },
        "refresh" | "r" => WatchCommand::Refresh,
        "reconnect" => WatchCommand::Reconnect,
        "help" | "?" => WatchCommand::Help,
        "quit" | "q" | "exit" => WatchCommand::Quit,
        other => return Err(format!("Unknown command '{}'. {}", other, HELP)),
    };
    Ok(Some(parsed))
}

/// Follow the poll live
pub async fn run(config: &Config, output: &Output) -> Result<()> {
    let mut engine = SyncEngine::from_config(config).context("Failed to start the sync engine")?;
    let mut notices = engine
        .take_notices()
        .context("Notice stream already taken")?;
    let mut states = engine.subscribe();

    output.message(HELP);
    let initial = states.borrow_and_update().clone();
    output.print_state(&initial);

    // Votes resolve in the background so the view keeps updating
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel::<SubmitOutcome>();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                output.print_state(&state);
            }
            Some(outcome) = outcomes.recv() => {
                // Sent votes are reported through notices
                if !outcome.was_sent() {
                    output.print_outcome(&outcome);
                }
            }
            notice = notices.recv() => match notice {
                Some(notice) => output.print_notice(&notice),
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(WatchCommand::Vote(option_id))) => {
                        let vote = engine.submit_vote(&option_id);
                        let outcome_tx = outcome_tx.clone();
                        tokio::spawn(async move {
                            let _ = outcome_tx.send(vote.await);
                        });
                    }
                    Ok(Some(WatchCommand::Refresh)) => engine.refresh(),
                    Ok(Some(WatchCommand::Reconnect)) => engine.reconnect(),
                    Ok(Some(WatchCommand::Help)) => output.message(HELP),
                    Ok(Some(WatchCommand::Quit)) => break,
                    Ok(None) => {}
                    Err(message) => output.message(&message),
                },
                // Keep watching until Ctrl-C when stdin is closed
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Could not read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = &mut ctrl_c => break,
        }
    }

    engine.shutdown().await;
    Ok(())
}
