use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{dom::Page, events::EventBus, platform::Platform, utils::read};

use super::config::SensingConfig;
use super::locator::{InputLocator, LocatedInput};
use super::loop_worker::{DetectorContext, Submission};
use super::supervisor::{supervise, CurrentInput, PipelineContext, PipelineStatus};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "sensing";

use crate::log_info;

/// A running pipeline. Dropping it without `teardown` leaves the task
/// running until the runtime shuts down.
pub struct PipelineHandle {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl PipelineHandle {
    /// Cancel the pipeline and wait until its detector and subscriptions are
    /// gone.
    pub async fn teardown(self) -> Result<()> {
        self.cancel_token.cancel();
        self.handle
            .await
            .context("pipeline task failed to join")
            .map(|_| ())
    }
}

/// Owns the single detection pipeline for one page.
pub struct SensingController<P: Page> {
    page: Arc<P>,
    platform: Platform,
    config: SensingConfig,
    extra_patterns: Vec<String>,
    submissions: mpsc::UnboundedSender<Submission>,
    events: EventBus,
    status: Arc<watch::Sender<PipelineStatus>>,
    current: CurrentInput<P::Node>,
    pipeline: Option<PipelineHandle>,
}

impl<P: Page> SensingController<P> {
    pub fn new(
        page: Arc<P>,
        config: SensingConfig,
        extra_patterns: Vec<String>,
        submissions: mpsc::UnboundedSender<Submission>,
        events: EventBus,
    ) -> Self {
        let platform = Platform::from_hostname(&page.hostname());
        let (status, _) = watch::channel(PipelineStatus::default());

        Self {
            page,
            platform,
            config,
            extra_patterns,
            submissions,
            events,
            status: Arc::new(status),
            current: Arc::new(RwLock::new(None)),
            pipeline: None,
        }
    }

    /// Start detection. A pipeline that is already running is torn down
    /// first, so there is never more than one.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(previous) = self.pipeline.take() {
            log_info!("restarting pipeline");
            previous.teardown().await?;
        }

        let ctx = PipelineContext {
            page: Arc::clone(&self.page),
            locator: InputLocator::new(self.platform, &self.extra_patterns),
            detector: DetectorContext {
                platform: self.platform,
                config: self.config.clone(),
                events: self.events.clone(),
                submissions: self.submissions.clone(),
            },
            status: Arc::clone(&self.status),
            current: Arc::clone(&self.current),
        };

        self.status.send_modify(|s| s.acquisitions = 0);

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(supervise(ctx, cancel_token.clone()));

        self.pipeline = Some(PipelineHandle {
            handle,
            cancel_token,
        });
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        match self.pipeline.take() {
            Some(pipeline) => pipeline.teardown().await,
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Replace the user patterns tried ahead of the built-in lists. Takes
    /// effect on the next `start`.
    pub fn set_extra_patterns(&mut self, extra_patterns: Vec<String>) {
        self.extra_patterns = extra_patterns;
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn current_input(&self) -> Option<LocatedInput<P::Node>> {
        read(&self.current).clone()
    }
}
