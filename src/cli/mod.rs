//! CLI command definitions and parsing
use crate::query::RawObjectConstraint;
use crate::retrieval::SortKey;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "framefind",
    version,
    about = "Find video keyframes by description, detected objects and audio tags",
    long_about = "framefind fuses keyword relevance and visual embedding similarity with \
                  Reciprocal Rank Fusion, then filters keyframes by how many confident \
                  detections of each object they contain."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/framefind/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "fast")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search keyframes
    Query {
        /// Free-text description of the scene
        #[arg(default_value = "")]
        description: String,

        /// Object constraint as label:confidence[:min[:max]] (repeatable)
        #[arg(short, long = "object", value_name = "OBJECT", value_parser = parse_object_arg)]
        objects: Vec<RawObjectConstraint>,

        /// Required audio tag
        #[arg(short, long)]
        audio: Option<String>,

        /// Read the request from a JSON file instead of the arguments
        #[arg(long, value_name = "FILE", conflicts_with_all = ["description", "objects", "audio"])]
        request: Option<PathBuf>,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Result ordering
        #[arg(short, long, default_value = "rrf")]
        sort: SortKey,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show local store statistics
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parse `label:confidence[:min[:max]]`
///
/// Range checks are left to query validation so every problem is reported
/// together.
pub fn parse_object_arg(arg: &str) -> Result<RawObjectConstraint, String> {
    let parts: Vec<&str> = arg.split(':').collect();
    if parts.len() < 2 || parts.len() > 4 {
        return Err(format!(
            "expected label:confidence[:min[:max]], got '{}'",
            arg
        ));
    }

    let confidence: f64 = parts[1]
        .parse()
        .map_err(|_| format!("invalid confidence '{}'", parts[1]))?;
    let mut constraint = RawObjectConstraint::new(parts[0], confidence);

    if let Some(min) = parts.get(2) {
        let min: i64 = min
            .parse()
            .map_err(|_| format!("invalid min_instances '{}'", min))?;
        constraint = constraint.with_min(min);
    }

    if let Some(max) = parts.get(3) {
        let max: i64 = max
            .parse()
            .map_err(|_| format!("invalid max_instances '{}'", max))?;
        constraint = constraint.with_max(max);
    }

    Ok(constraint)
}
