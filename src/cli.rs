use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Estimates the energy cost of prompts typed into AI chat pages.
#[derive(Parser)]
#[command(name = "prompt-meter")]
#[command(version)]
pub(crate) struct Cli {
    /// Directory holding the stats database and settings file
    #[arg(long, env = "PROMPT_METER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the tracker against a scripted page timeline
    Replay {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Page hostname, overriding the scenario's
        #[arg(long)]
        origin: Option<String>,
    },

    /// Print stored stats and recent history
    Stats {
        /// Days of prompt history to aggregate
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Reset the session counters
    Reset,
}
