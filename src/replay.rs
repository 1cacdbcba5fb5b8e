//! Scripted page timelines for the `replay` command.
//!
//! A scenario mounts markup into an in-memory page and drives it the way a
//! user and the host page would, while the full tracker runs against it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::{
    app::{open_stats, Tracker},
    db::StatsSnapshot,
    dom::memory::{MemoryNode, MemoryPage, NodeSpec},
    events::{EventBus, TrackerEvent},
    sensing::SensingConfig,
};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "replay";

use crate::{log_info, log_warn};

const DEFAULT_ORIGIN: &str = "chatgpt.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub origin: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Mount `node` under the first match of `parent` (the body by default).
    Mount {
        #[serde(default)]
        parent: Option<String>,
        node: NodeSpec,
    },
    Type {
        target: String,
        text: String,
    },
    Clear {
        target: String,
    },
    Remove {
        target: String,
    },
    /// Click the located input's submit control, then clear the input the
    /// way the host page does after sending.
    ClickSubmit,
    AcceptOptimization,
    Wait {
        ms: u64,
    },
}

impl Scenario {
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("invalid scenario JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&contents)
    }
}

/// Replay `scenario` against a fresh in-memory page, passing every tracker
/// event to `on_event`. Returns the stats after the tracker shut down.
pub async fn run_scenario<F>(
    scenario: Scenario,
    origin_override: Option<String>,
    data_dir: &Path,
    config: SensingConfig,
    mut on_event: F,
) -> Result<StatsSnapshot>
where
    F: FnMut(&TrackerEvent) + Send + 'static,
{
    let origin = origin_override
        .or(scenario.origin.clone())
        .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
    let page = MemoryPage::new(origin.clone());
    let events = EventBus::default();

    let forward_cancel = CancellationToken::new();
    let forwarder = {
        let mut rx = events.subscribe();
        let cancel_token = forward_cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        while let Ok(event) = rx.try_recv() {
                            on_event(&event);
                        }
                        break;
                    }
                    next = rx.recv() => match next {
                        Ok(event) => on_event(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            log_warn!("event printer fell behind, {skipped} events skipped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    };

    let stats = open_stats(data_dir, events.clone()).await?;
    let mut tracker = Tracker::new(Arc::new(page.clone()), config, stats, events);
    tracker.start().await?;
    log_info!("replaying {} steps on {}", scenario.steps.len(), origin);

    let outcome = run_steps(&scenario.steps, &page, &tracker).await;

    let stats = tracker.stats().clone();
    tracker.shutdown().await?;
    forward_cancel.cancel();
    forwarder.await.context("event printer failed to join")?;

    outcome?;
    Ok(stats.get_stats())
}

async fn run_steps(steps: &[Step], page: &MemoryPage, tracker: &Tracker<MemoryPage>) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        apply_step(step, page, tracker)
            .await
            .with_context(|| format!("step {} ({step:?}) failed", index + 1))?;
    }
    Ok(())
}

async fn apply_step(step: &Step, page: &MemoryPage, tracker: &Tracker<MemoryPage>) -> Result<()> {
    match step {
        Step::Mount { parent, node } => {
            let parent = match parent {
                Some(selector) => find(page, selector)?,
                None => page.body_node(),
            };
            page.mount(&parent, node.clone());
        }
        Step::Type { target, text } => page.type_text(&find(page, target)?, text)?,
        Step::Clear { target } => page.type_text(&find(page, target)?, "")?,
        Step::Remove { target } => page.remove(&find(page, target)?),
        Step::ClickSubmit => {
            let input = tracker
                .sensing()
                .current_input()
                .ok_or_else(|| anyhow!("no input located yet"))?;
            if let Some(submit) = &input.submit {
                page.click(submit);
            }
            page.type_text(&input.node, "")?;
        }
        Step::AcceptOptimization => {
            if tracker.accept_optimization().await?.is_none() {
                log_info!("nothing to optimize");
            }
        }
        Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(())
}

fn find(page: &MemoryPage, selector: &str) -> Result<MemoryNode> {
    page.find(selector)?
        .ok_or_else(|| anyhow!("nothing on the page matches '{selector}'"))
}
