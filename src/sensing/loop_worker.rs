use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    dom::DomNode,
    estimator::{self, format, optimize_prompt},
    events::{EventBus, TrackerEvent},
    platform::Platform,
};

use super::config::SensingConfig;
use super::detector::SubmissionDetector;
use super::reader::read_value;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "detector";

use crate::{log_debug, log_info, log_warn};

/// A prompt the detector inferred was sent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub text: String,
    pub platform: Platform,
    pub detected_at: DateTime<Utc>,
}

/// Everything one detector task needs besides the node it polls.
#[derive(Clone)]
pub(crate) struct DetectorContext {
    pub platform: Platform,
    pub config: SensingConfig,
    pub events: EventBus,
    pub submissions: mpsc::UnboundedSender<Submission>,
}

struct PollState<N> {
    node: N,
    detector: SubmissionDetector,
    last_read: String,
    ticks: u64,
}

pub(crate) async fn detection_loop<N: DomNode>(
    node: N,
    ctx: DetectorContext,
    poke: Arc<Notify>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(ctx.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = PollState {
        node,
        detector: SubmissionDetector::new(),
        last_read: String::new(),
        ticks: 0,
    };

    log_info!(
        "detector started ({}ms cadence, platform {})",
        ctx.config.poll_interval.as_millis(),
        ctx.platform
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("detector shutting down after {} ticks", state.ticks);
                break;
            }
            _ = ticker.tick() => poll_once(&mut state, &ctx),
            _ = poke.notified() => poll_once(&mut state, &ctx),
        }
    }
}

fn poll_once<N: DomNode>(state: &mut PollState<N>, ctx: &DetectorContext) {
    state.ticks += 1;
    let text = read_value(&state.node);

    if ctx.config.verbose {
        log_info!("tick {}: {} chars", state.ticks, text.chars().count());
    } else {
        log_debug!("tick {}: {} chars", state.ticks, text.chars().count());
    }

    if text != state.last_read {
        publish_live_estimate(&text, ctx);
        state.last_read = text.clone();
    }

    if let Some(payload) = state.detector.observe(&text) {
        let submission = Submission {
            id: Uuid::new_v4(),
            text: payload,
            platform: ctx.platform,
            detected_at: Utc::now(),
        };
        log_info!(
            "submission detected ({} chars) id={}",
            submission.text.chars().count(),
            submission.id
        );
        if ctx.submissions.send(submission).is_err() {
            log_warn!("submission dropped: stats receiver is gone");
        }
    }
}

fn publish_live_estimate(text: &str, ctx: &DetectorContext) {
    let estimate = estimator::estimate(text, ctx.platform);
    ctx.events.emit(TrackerEvent::LiveEstimate {
        platform: ctx.platform,
        estimate,
        energy_text: format::format_energy(estimate.energy_wh),
        carbon_text: format::format_carbon(estimate.carbon_g),
        color: format::energy_color(estimate.energy_wh).to_string(),
        suggestion: format::suggestion(estimate.tokens),
        comparison: format::comparison(estimate.energy_wh).to_string(),
    });

    if estimate.tokens > ctx.config.optimization_min_tokens {
        let optimization = optimize_prompt(text, ctx.platform);
        if optimization.optimized_tokens < optimization.original_tokens {
            ctx.events.emit(TrackerEvent::OptimizationAvailable {
                original_tokens: optimization.original_tokens,
                optimized_tokens: optimization.optimized_tokens,
                percent_saved: optimization.percent_saved,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryPage, NodeSpec};
    use std::time::Duration;

    fn context() -> (DetectorContext, mpsc::UnboundedReceiver<Submission>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = DetectorContext {
            platform: Platform::Chatgpt,
            config: SensingConfig::default(),
            events: EventBus::default(),
            submissions: tx,
        };
        (ctx, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_submission_per_clear() {
        let page = MemoryPage::new("chatgpt.com");
        let input = page.mount_in_body(NodeSpec::new("textarea"));
        let (ctx, mut rx) = context();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(detection_loop(
            input.clone(),
            ctx,
            Arc::new(Notify::new()),
            cancel.clone(),
        ));

        page.type_text(&input, "hello").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        page.type_text(&input, "hello world").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        page.type_text(&input, "").unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        cancel.cancel();
        task.await.unwrap();

        let submission = rx.recv().await.unwrap();
        assert_eq!(submission.text, "hello world");
        assert_eq!(submission.platform, Platform::Chatgpt);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_live_estimate_on_change_only() {
        let page = MemoryPage::new("chatgpt.com");
        let input = page.mount_in_body(NodeSpec::new("textarea"));
        let (ctx, _rx) = context();
        let mut events = ctx.events.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(detection_loop(
            input.clone(),
            ctx,
            Arc::new(Notify::new()),
            cancel.clone(),
        ));

        page.type_text(&input, "abcdefgh").unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        cancel.cancel();
        task.await.unwrap();

        let mut estimates = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let TrackerEvent::LiveEstimate {
                estimate,
                energy_text,
                carbon_text,
                ..
            } = event
            {
                estimates.push((estimate.tokens, energy_text, carbon_text));
            }
        }
        assert_eq!(
            estimates,
            vec![(2, "0.80 mWh".to_string(), "0.40 mg CO₂".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn offers_optimization_for_long_prompts() {
        let page = MemoryPage::new("chatgpt.com");
        let input = page.mount_in_body(NodeSpec::new("textarea"));
        let (ctx, _rx) = context();
        let mut events = ctx.events.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(detection_loop(
            input.clone(),
            ctx,
            Arc::new(Notify::new()),
            cancel.clone(),
        ));

        let long = "please just explain in order to understand ".repeat(6);
        page.type_text(&input, &long).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        task.await.unwrap();

        let mut offered = false;
        while let Ok(event) = events.try_recv() {
            if let TrackerEvent::OptimizationAvailable { percent_saved, .. } = event {
                assert!(percent_saved > 0);
                offered = true;
            }
        }
        assert!(offered);
    }

    #[tokio::test(start_paused = true)]
    async fn survives_failing_reads() {
        let page = MemoryPage::new("chatgpt.com");
        let input = page.mount_in_body(NodeSpec::new("textarea").value("kept"));
        let (ctx, mut rx) = context();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(detection_loop(
            input.clone(),
            ctx,
            Arc::new(Notify::new()),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        page.set_broken(&input, true);
        tokio::time::sleep(Duration::from_millis(150)).await;
        page.set_broken(&input, false);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        task.await.unwrap();

        // A failed read looks like a cleared field.
        assert_eq!(rx.recv().await.unwrap().text, "kept");
    }
}
