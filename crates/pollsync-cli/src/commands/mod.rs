//! Command handlers

pub mod config;
pub mod show;
pub mod status;
pub mod vote;
pub mod watch;
