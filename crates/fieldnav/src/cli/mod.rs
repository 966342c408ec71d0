//! Command-line interface for fieldnav.
//!
//! This module provides the CLI structure for the `fieldnav` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, IncidentsCommand, MessageCommand, NavigateCommand, RouteCommand, WatchCommand,
};

/// fieldnav - Live navigation for crowd-safety responders
///
/// Fetches active incidents from the control room, requests crowd-aware
/// walking routes and guides the responder to the incident step by step.
#[derive(Debug, Parser)]
#[command(name = "fieldnav")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the active incident feed
    Incidents(IncidentsCommand),

    /// Poll the incident feed and print changes
    Watch(WatchCommand),

    /// Run a guided navigation session
    Navigate(NavigateCommand),

    /// Request a route without navigating it
    Route(RouteCommand),

    /// Send a message to the control room
    Message(MessageCommand),

    /// Show the venue location table
    Venue,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
