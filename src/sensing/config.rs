use std::time::Duration;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "sensing";

use crate::log_warn;

/// Timing knobs for the detection pipeline.
#[derive(Debug, Clone)]
pub struct SensingConfig {
    /// Detector poll cadence. Short enough to catch the host clearing the
    /// field on submit.
    pub poll_interval: Duration,

    /// Pause after the input disappears, letting the host finish re-rendering
    /// before discovery restarts.
    pub settle_delay: Duration,

    /// Fixed backoff between failed locate attempts.
    pub retry_backoff: Duration,

    /// Live text above this many tokens gets an optimization offer.
    pub optimization_min_tokens: u64,

    /// Log every tick at info instead of debug.
    pub verbose: bool,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(1000),
            retry_backoff: Duration::from_millis(1000),
            optimization_min_tokens: 50,
            verbose: false,
        }
    }
}

impl SensingConfig {
    /// Defaults overridden by `PROMPT_METER_POLL_MS`, `PROMPT_METER_SETTLE_MS`,
    /// `PROMPT_METER_RETRY_MS` and `PROMPT_METER_DEBUG`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_millis("PROMPT_METER_POLL_MS") {
            config.poll_interval = ms;
        }
        if let Some(ms) = env_millis("PROMPT_METER_SETTLE_MS") {
            config.settle_delay = ms;
        }
        if let Some(ms) = env_millis("PROMPT_METER_RETRY_MS") {
            config.retry_backoff = ms;
        }
        config.verbose = std::env::var("PROMPT_METER_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    parse_millis(&raw).or_else(|| {
        log_warn!("ignoring {key}={raw:?}: expected a positive number of milliseconds");
        None
    })
}

fn parse_millis(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => None,
    }
}
