//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use pollsync_core::{ConnectionStatus, Notice, NoticeLevel, Poll, SubmitOutcome, SyncState};

/// Width of the tally bar in characters
const BAR_WIDTH: usize = 20;

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

    /// Print a poll with its tallies
    pub fn print_poll(&self, poll: &Poll, has_voted: bool) {
        match self.format {
            OutputFormat::Human => {
                for line in render_poll(poll, has_voted) {
                    println!("{}", line);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({ "poll": poll, "hasVoted": has_voted })
                );
            }
            OutputFormat::Quiet => {
                for option in &poll.options {
                    println!("{}={}", option.id, option.votes);
                }
            }
        }
    }

    /// Print an engine state snapshot
    pub fn print_state(&self, state: &SyncState) {
        match self.format {
            OutputFormat::Human => {
                println!();
                println!("── {} ──", status_line(state));
                if let Some(ref error) = state.error {
                    println!("✗ {}", error);
                    println!("  Type `refresh` to try again.");
                }
                match state.poll {
                    Some(ref poll) => {
                        for line in render_poll(poll, state.has_voted) {
                            println!("{}", line);
                        }
                    }
                    None if state.loading => println!("Loading poll..."),
                    None => {}
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(state) {
                    println!("{}", json);
                }
            }
            OutputFormat::Quiet => {
                if let Some(ref poll) = state.poll {
                    println!("{}", poll.total_votes);
                }
            }
        }
    }

    /// Print a transient notification
    pub fn print_notice(&self, notice: &Notice) {
        match self.format {
            OutputFormat::Human => {
                let marker = match notice.level {
                    NoticeLevel::Info => "ℹ",
                    NoticeLevel::Success => "✓",
                    NoticeLevel::Warning => "⚠",
                    NoticeLevel::Error => "✗",
                };
                println!("{} {}", marker, notice.message);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "notice": notice }));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print the result of a vote
    pub fn print_outcome(&self, outcome: &SubmitOutcome) {
        match self.format {
            OutputFormat::Human => {
                if outcome.is_accepted() {
                    println!("✓ {}", outcome);
                } else {
                    println!("✗ {}", outcome);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "accepted": outcome.is_accepted(),
                        "sent": outcome.was_sent(),
                        "message": outcome.to_string()
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
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
}

fn status_line(state: &SyncState) -> String {
    let mut line = match state.connection_status() {
        ConnectionStatus::Connected => "live".to_string(),
        ConnectionStatus::Connecting if state.connection.attempts > 0 => {
            format!("reconnecting (attempt {})", state.connection.attempts + 1)
        }
        ConnectionStatus::Connecting => "connecting".to_string(),
        ConnectionStatus::Disconnected if state.connection.is_exhausted() => {
            "offline, type `reconnect`".to_string()
        }
        ConnectionStatus::Disconnected => "offline".to_string(),
    };
    if state.is_reconnecting {
        line.push_str(", reconnecting");
    }
    if state.submitting {
        line.push_str(", submitting vote");
    }
    line
}

fn render_poll(poll: &Poll, has_voted: bool) -> Vec<String> {
    let mut lines = Vec::with_capacity(poll.options.len() + 4);

    let status = if poll.is_active { "open" } else { "closed" };
    lines.push(format!("{}  ({}, {})", poll.title, poll.id, status));
    if let Some(ref description) = poll.description {
        lines.push(truncate(description, 70));
    }

    let id_width = poll.options.iter().map(|o| o.id.len()).max().unwrap_or(0);
    let text_width = poll
        .options
        .iter()
        .map(|o| o.text.chars().count().min(30))
        .max()
        .unwrap_or(0);

    for option in &poll.options {
        let percentage = poll.percentage(&option.id);
        lines.push(format!(
            "  {:<id_width$}  {:<text_width$}  {}  {:>5.1}%  ({})",
            option.id,
            truncate(&option.text, 30),
            bar(percentage),
            percentage,
            option.votes,
        ));
    }

    let voted = if has_voted { " · you have voted" } else { "" };
    lines.push(format!("  {} vote(s) total{}", poll.total_votes, voted));
    lines
}

fn bar(percentage: f64) -> String {
    let filled = ((percentage / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
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
