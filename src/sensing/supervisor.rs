//! Discovery and re-acquisition.
//!
//! One pipeline task runs this loop: locate the input, start its detector,
//! then watch mutation notifications until the input is detached. A detached
//! input tears the detector down, waits for the host to settle and starts
//! over.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    dom::{DomNode, Page, PageEvent},
    events::TrackerEvent,
    utils::write,
};

use super::locator::{InputLocator, LocatedInput};
use super::loop_worker::{detection_loop, DetectorContext};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "supervisor";

use crate::{log_debug, log_error, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelinePhase {
    Stopped,
    Searching,
    Watching,
    Settling,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub phase: PipelinePhase,
    /// Selector of the pattern that located the current input.
    pub pattern: Option<String>,
    /// How many times an input has been located since the pipeline started.
    pub acquisitions: u64,
    /// Detector tasks currently polling. Never more than one.
    pub active_detectors: usize,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            phase: PipelinePhase::Stopped,
            pattern: None,
            acquisitions: 0,
            active_detectors: 0,
        }
    }
}

pub(crate) type StatusSender = Arc<watch::Sender<PipelineStatus>>;
pub(crate) type CurrentInput<N> = Arc<RwLock<Option<LocatedInput<N>>>>;

pub(crate) struct PipelineContext<P: Page> {
    pub page: Arc<P>,
    pub locator: InputLocator,
    pub detector: DetectorContext,
    pub status: StatusSender,
    pub current: CurrentInput<P::Node>,
}

enum WatchOutcome {
    Detached,
    Cancelled,
}

/// Counts a running detector in the pipeline status for as long as it lives.
struct ActiveDetector {
    status: StatusSender,
}

impl ActiveDetector {
    fn enter(status: StatusSender) -> Self {
        status.send_modify(|s| s.active_detectors += 1);
        Self { status }
    }
}

impl Drop for ActiveDetector {
    fn drop(&mut self) {
        self.status
            .send_modify(|s| s.active_detectors = s.active_detectors.saturating_sub(1));
    }
}

struct DetectorHandle {
    cancel_token: CancellationToken,
    poke: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl DetectorHandle {
    fn spawn<N: DomNode>(
        node: N,
        ctx: DetectorContext,
        status: StatusSender,
        parent: &CancellationToken,
    ) -> Self {
        let cancel_token = parent.child_token();
        let poke = Arc::new(Notify::new());

        let handle = tokio::spawn({
            let cancel_token = cancel_token.clone();
            let poke = Arc::clone(&poke);
            async move {
                let _active = ActiveDetector::enter(status);
                detection_loop(node, ctx, poke, cancel_token).await;
            }
        });

        Self {
            cancel_token,
            poke,
            handle,
        }
    }

    /// Request an immediate extra tick.
    fn poke(&self) {
        self.poke.notify_one();
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(err) = self.handle.await {
            log_error!("detector task failed to join: {err}");
        }
    }
}

pub(crate) async fn supervise<P: Page>(ctx: PipelineContext<P>, cancel_token: CancellationToken) {
    log_info!("pipeline started on {}", ctx.page.hostname());

    loop {
        let Some(located) = discover(&ctx, &cancel_token).await else {
            break;
        };

        // Subscribe before checking liveness so a removal right after the
        // locate is not missed.
        let mut page_events = ctx.page.subscribe();

        ctx.status.send_modify(|s| {
            s.phase = PipelinePhase::Watching;
            s.pattern = Some(located.pattern.selector.to_string());
            s.acquisitions += 1;
        });
        *write(&ctx.current) = Some(located.clone());
        ctx.detector.events.emit(TrackerEvent::InputLocated {
            platform: ctx.locator.platform(),
            pattern: located.pattern.selector.to_string(),
            has_submit_control: located.submit.is_some(),
        });

        let detector = DetectorHandle::spawn(
            located.node.clone(),
            ctx.detector.clone(),
            Arc::clone(&ctx.status),
            &cancel_token,
        );

        let outcome = watch_input(&located, &mut page_events, &detector, &cancel_token).await;

        detector.shutdown().await;
        *write(&ctx.current) = None;
        drop(page_events);

        match outcome {
            WatchOutcome::Cancelled => break,
            WatchOutcome::Detached => {
                log_info!(
                    "input detached, re-searching in {}ms",
                    ctx.detector.config.settle_delay.as_millis()
                );
                ctx.detector.events.emit(TrackerEvent::InputLost);
                ctx.status.send_modify(|s| {
                    s.phase = PipelinePhase::Settling;
                    s.pattern = None;
                });

                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => break,
                    _ = tokio::time::sleep(ctx.detector.config.settle_delay) => {}
                }
            }
        }
    }

    ctx.status.send_modify(|s| {
        s.phase = PipelinePhase::Stopped;
        s.pattern = None;
    });
    log_info!("pipeline stopped");
}

/// Locate with a fixed backoff until found. `None` only when cancelled.
async fn discover<P: Page>(
    ctx: &PipelineContext<P>,
    cancel_token: &CancellationToken,
) -> Option<LocatedInput<P::Node>> {
    let mut attempts: u64 = 0;
    loop {
        if cancel_token.is_cancelled() {
            return None;
        }
        attempts += 1;
        if let Some(located) = ctx.locator.locate(ctx.page.as_ref()) {
            return Some(located);
        }

        if attempts == 1 {
            ctx.status.send_modify(|s| s.phase = PipelinePhase::Searching);
        }
        log_debug!("input not found (attempt {attempts}), retrying");

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return None,
            _ = tokio::time::sleep(ctx.detector.config.retry_backoff) => {}
        }
    }
}

async fn watch_input<N: DomNode>(
    located: &LocatedInput<N>,
    page_events: &mut broadcast::Receiver<PageEvent<N>>,
    detector: &DetectorHandle,
    cancel_token: &CancellationToken,
) -> WatchOutcome {
    if !located.is_attached() {
        return WatchOutcome::Detached;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return WatchOutcome::Cancelled,
            event = page_events.recv() => match event {
                Ok(PageEvent::Mutation) => {
                    if !located.is_attached() {
                        return WatchOutcome::Detached;
                    }
                }
                Ok(PageEvent::Input(node)) => {
                    if node.is_inclusive_descendant_of(&located.node) {
                        detector.poke();
                    }
                }
                Ok(PageEvent::Click(target)) => {
                    if located.is_submit_click(&target) {
                        log_debug!("submit control clicked");
                        detector.poke();
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log_debug!("missed {skipped} page events, rechecking");
                    if !located.is_attached() {
                        return WatchOutcome::Detached;
                    }
                }
                Err(RecvError::Closed) => {
                    // The page stopped publishing; polling carries on alone.
                    log_info!("page event stream closed");
                    cancel_token.cancelled().await;
                    return WatchOutcome::Cancelled;
                }
            },
        }
    }
}
