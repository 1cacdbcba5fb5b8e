use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    db::Database,
    dom::{DomNode, Page},
    estimator::{optimize_prompt, Optimization},
    events::EventBus,
    sensing::{read_value, SensingConfig, SensingController, Submission},
    settings::SettingsStore,
    stats::StatsController,
};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "tracker";

use crate::{log_error, log_info, log_warn};

pub const DATABASE_FILE: &str = "prompt-meter.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";

/// Open the store and settings kept in `data_dir`. When the store cannot be
/// opened or read the counters live in memory for this run only.
pub async fn open_stats(data_dir: &Path, events: EventBus) -> Result<StatsController> {
    let settings_path = data_dir.join(SETTINGS_FILE);
    let settings = Arc::new(SettingsStore::new(settings_path.clone()).unwrap_or_else(|err| {
        log_warn!("{err:#}, using default settings");
        SettingsStore::with_defaults(settings_path)
    }));

    match open_persistent(data_dir, Arc::clone(&settings), events.clone()).await {
        Ok(stats) => Ok(stats),
        Err(err) => {
            log_error!("stats store unavailable, counting in memory only: {err:#}");
            let database = Database::in_memory().context("failed to open in-memory stats")?;
            StatsController::load(database, settings, events).await
        }
    }
}

async fn open_persistent(
    data_dir: &Path,
    settings: Arc<SettingsStore>,
    events: EventBus,
) -> Result<StatsController> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let database = Database::new(data_dir.join(DATABASE_FILE))?;
    StatsController::load(database, settings, events).await
}

/// The tracker for one page: detection pipeline, stats consumer and the
/// daily maintenance job.
pub struct Tracker<P: Page> {
    origin: String,
    stats: StatsController,
    sensing: SensingController<P>,
    submissions: Option<mpsc::UnboundedReceiver<Submission>>,
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<P: Page> Tracker<P> {
    pub fn new(page: Arc<P>, config: SensingConfig, stats: StatsController, events: EventBus) -> Self {
        let origin = page.hostname();
        let (submissions_tx, submissions_rx) = mpsc::unbounded_channel();
        let sensing = SensingController::new(
            page,
            config,
            stats.settings().extra_input_patterns,
            submissions_tx,
            events,
        );

        Self {
            origin,
            stats,
            sensing,
            submissions: Some(submissions_rx),
            cancel_token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Start (or restart) the pipeline. The stats consumer and maintenance
    /// job are spawned on the first call.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(submissions) = self.submissions.take() {
            let stats = self.stats.clone();
            let origin = self.origin.clone();
            let cancel_token = self.cancel_token.clone();
            self.tasks.push(tokio::spawn(async move {
                stats.run_submissions(submissions, origin, cancel_token).await;
            }));
            self.tasks
                .push(self.stats.spawn_maintenance(self.cancel_token.clone()));
        }

        self.sensing
            .set_extra_patterns(self.stats.settings().extra_input_patterns);
        self.sensing.start().await?;
        log_info!("tracking {} as {}", self.origin, self.sensing.platform());
        Ok(())
    }

    /// Rewrite the current input with its optimized form and credit the
    /// saving. `None` when there is no input or nothing to shorten.
    pub async fn accept_optimization(&self) -> Result<Option<Optimization>> {
        let Some(input) = self.sensing.current_input() else {
            return Ok(None);
        };

        let text = read_value(&input.node);
        let optimization = optimize_prompt(&text, self.sensing.platform());
        if optimization.optimized_tokens >= optimization.original_tokens {
            return Ok(None);
        }

        input
            .node
            .replace_text(&optimization.optimized)
            .context("failed to write optimized prompt into the input")?;
        self.stats
            .record_energy_saved(optimization.energy_saved)
            .await;

        log_info!(
            "optimization applied: {} -> {} tokens",
            optimization.original_tokens,
            optimization.optimized_tokens
        );
        Ok(Some(optimization))
    }

    pub fn stats(&self) -> &StatsController {
        &self.stats
    }

    pub fn sensing(&self) -> &SensingController<P> {
        &self.sensing
    }

    /// Stop detection, record anything still queued and stop background
    /// jobs.
    pub async fn shutdown(mut self) -> Result<()> {
        self.sensing.stop().await?;
        self.cancel_token.cancel();
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                log_error!("background task failed to join: {err}");
            }
        }
        log_info!("tracker stopped");
        Ok(())
    }
}
