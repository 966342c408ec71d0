//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Subcommand};

/// Incident feed arguments.
#[derive(Debug, Args)]
pub struct IncidentsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Incident polling arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Stop after this many polls
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
}

/// Navigation session arguments.
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["incident", "zone"])))]
pub struct NavigateCommand {
    /// Navigate to an active incident by id
    #[arg(short, long, value_name = "ID")]
    pub incident: Option<String>,

    /// Navigate to a venue location or zone
    #[arg(short, long, value_name = "NAME")]
    pub zone: Option<String>,

    /// Start with voice guidance off
    #[arg(long)]
    pub no_voice: bool,

    /// Start with GPS tracking off
    #[arg(long)]
    pub no_tracking: bool,

    /// Print map overlays as JSON lines
    #[arg(short, long)]
    pub json: bool,
}

/// Route request arguments.
#[derive(Debug, Args)]
pub struct RouteCommand {
    /// Destination location
    #[arg(short, long, value_name = "NAME")]
    pub to: String,

    /// Start location (defaults to the configured origin)
    #[arg(short, long, value_name = "NAME")]
    pub from: Option<String>,

    /// Locations to route around
    #[arg(short, long, value_name = "NAME")]
    pub avoid: Vec<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Operator message arguments.
#[derive(Debug, Args)]
pub struct MessageCommand {
    /// Message text
    #[arg(short, long)]
    pub text: String,

    /// Incident the message refers to
    #[arg(short, long, value_name = "ID")]
    pub incident: Option<String>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl NavigateCommand {
    /// Whether the target is an incident id rather than a place.
    #[must_use]
    pub fn is_incident(&self) -> bool {
        self.incident.is_some()
    }
}
