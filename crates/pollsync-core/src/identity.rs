//! Client identity and vote record
//!
//! Keeps the anonymous client token and the list of polls this client has
//! voted in, both persisted under the data directory so they survive
//! restarts.
//!
//! Files:
//! - `userToken` - the opaque client token (plain text)
//! - `votedPolls` - JSON array of poll ids, in the order they were voted
//!
//! Nothing in here returns an error. A missing, unreadable or corrupt file
//! reads as "no token yet" / "not voted" and is recreated on the next write,
//! so the record can never stop a poll from rendering.
//!
//! The token is a cooperative hint that lets the server spot repeat votes.
//! It is not a credential; the server decides whether a vote counts.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::Config;

/// Persistent client token and voted-poll record
#[derive(Debug)]
pub struct ClientIdentity {
    token_path: PathBuf,
    voted_path: PathBuf,
    /// Token handed out by this instance, so it stays stable even if the
    /// disk write failed
    token: Option<String>,
    /// Votes recorded by this instance, consulted even if the disk is not
    /// writable
    session_votes: HashSet<String>,
}

impl ClientIdentity {
    /// Create an identity store rooted at the configured data directory
    pub fn new(config: &Config) -> Self {
        Self {
            token_path: config.user_token_path(),
            voted_path: config.voted_polls_path(),
            token: None,
            session_votes: HashSet::new(),
        }
    }

    /// Create an identity store in an arbitrary directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            token_path: dir.join("userToken"),
            voted_path: dir.join("votedPolls"),
            token: None,
            session_votes: HashSet::new(),
        }
    }

    /// Return the client token, creating and persisting one on first use
    pub fn get_or_create_token(&mut self) -> String {
        if let Some(ref token) = self.token {
            return token.clone();
        }

        let token = match self.read_token() {
            Some(token) => token,
            None => {
                let token = generate_token();
                debug!("Created client token {}", token);
                if let Err(e) = atomic_write(&self.token_path, token.as_bytes()) {
                    warn!("Could not persist client token: {:#}", e);
                }
                token
            }
        };

        self.token = Some(token.clone());
        token
    }

    /// The client token if one exists, without creating it
    pub fn token(&self) -> Option<String> {
        self.token.clone().or_else(|| self.read_token())
    }

    /// Whether this client has recorded a vote in the given poll
    pub fn has_voted(&self, poll_id: &str) -> bool {
        self.session_votes.contains(poll_id) || self.voted_polls().iter().any(|id| id == poll_id)
    }

    /// Record a vote in the given poll
    ///
    /// Idempotent. The record is synced to disk before this returns.
    pub fn mark_voted(&mut self, poll_id: &str) {
        self.session_votes.insert(poll_id.to_string());

        let mut voted = self.voted_polls();
        if voted.iter().any(|id| id == poll_id) {
            return;
        }
        voted.push(poll_id.to_string());

        let result = serde_json::to_vec(&voted)
            .context("Failed to encode voted polls")
            .and_then(|bytes| atomic_write(&self.voted_path, &bytes));

        match result {
            Ok(()) => debug!("Recorded vote in poll {}", poll_id),
            Err(e) => warn!("Could not persist vote record for poll {}: {:#}", poll_id, e),
        }
    }

    /// All polls this client has voted in, oldest first
    pub fn voted_polls(&self) -> Vec<String> {
        let bytes = match fs::read(&self.voted_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Could not read {:?}, treating as empty: {}", self.voted_path, e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<String>>(&bytes) {
            Ok(voted) => voted,
            Err(e) => {
                warn!("Corrupt vote record {:?}, treating as empty: {}", self.voted_path, e);
                Vec::new()
            }
        }
    }

    fn read_token(&self) -> Option<String> {
        let content = fs::read_to_string(&self.token_path).ok()?;
        let token = content.trim();
        if token.is_empty() {
            warn!("Empty client token file {:?}, recreating", self.token_path);
            return None;
        }
        Some(token.to_string())
    }
}

/// Generate a fresh client token: `user_<unix millis>_<9 random chars>`
fn generate_token() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("user_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write to temp file {:?}", temp_path))?;

    file.sync_all()
        .with_context(|| format!("Failed to sync temp file {:?}", temp_path))?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    Ok(())
}
