//! Outbound signals for the overlay, popup and notification collaborators.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    db::models::{PromptRecord, StatsSnapshot},
    estimator::EnergyEstimate,
    platform::Platform,
    stats::Badge,
};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackerEvent {
    #[serde(rename_all = "camelCase")]
    InputLocated {
        platform: Platform,
        pattern: String,
        has_submit_control: bool,
    },
    InputLost,
    #[serde(rename_all = "camelCase")]
    LiveEstimate {
        platform: Platform,
        estimate: EnergyEstimate,
        energy_text: String,
        carbon_text: String,
        color: String,
        suggestion: String,
        comparison: String,
    },
    #[serde(rename_all = "camelCase")]
    OptimizationAvailable {
        original_tokens: u64,
        optimized_tokens: u64,
        percent_saved: u32,
    },
    PromptSubmitted {
        record: PromptRecord,
    },
    StatsUpdated {
        stats: StatsSnapshot,
    },
    HighEnergy {
        title: String,
        message: String,
    },
    BadgeChanged {
        badge: Badge,
    },
    #[serde(rename_all = "camelCase")]
    EnergySaved {
        amount_wh: f64,
        total_wh: f64,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: TrackerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = TrackerEvent::OptimizationAvailable {
            original_tokens: 60,
            optimized_tokens: 40,
            percent_saved: 33,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "optimizationAvailable");
        assert_eq!(json["percentSaved"], 33);

        let json = serde_json::to_value(TrackerEvent::InputLost).unwrap();
        assert_eq!(json["type"], "inputLost");
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(TrackerEvent::InputLost);

        let mut rx = bus.subscribe();
        bus.emit(TrackerEvent::InputLost);
        assert!(matches!(rx.recv().await.unwrap(), TrackerEvent::InputLost));
    }
}
