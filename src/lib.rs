pub mod app;
mod cli;
pub mod db;
pub mod dom;
pub mod estimator;
pub mod events;
pub mod platform;
pub mod replay;
pub mod sensing;
pub mod settings;
pub mod stats;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use cli::{Cli, Commands};
use events::EventBus;
use replay::{run_scenario, Scenario};
use sensing::SensingConfig;

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("prompt-meter"))
        .unwrap_or_else(|| PathBuf::from(".prompt-meter"))
}

async fn execute(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::Replay { scenario, origin } => {
            let scenario = Scenario::load(&scenario)?;
            let stats = run_scenario(
                scenario,
                origin,
                &data_dir,
                SensingConfig::from_env(),
                |event| match serde_json::to_string(event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => log::warn!("failed to serialize event: {err}"),
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&json!({ "stats": stats }))?);
        }
        Commands::Stats { days } => {
            let stats = app::open_stats(&data_dir, EventBus::default()).await?;
            let history = stats.get_history(days).await?;
            let daily = stats.daily_history().await?;
            let logged = stats.prompt_event_count().await?;
            let report = json!({
                "stats": stats.get_stats(),
                "loggedPrompts": logged,
                "settings": stats.settings(),
                "history": daily,
                "recent": history,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Reset => {
            let stats = app::open_stats(&data_dir, EventBus::default()).await?;
            let snapshot = stats.reset_session().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
        .and_then(|runtime| runtime.block_on(execute(cli)));

    if let Err(err) = result {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
