use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::estimator::EnergyEstimate;
use crate::platform::Platform;

/// One detected submission with its estimate, as logged in `prompt_events`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub platform: Platform,
    pub energy_wh: f64,
    pub carbon_g: f64,
    pub tokens: u64,
    /// Hostname of the page the prompt was typed into.
    pub url: String,
}

impl PromptRecord {
    pub fn new(
        id: String,
        timestamp: DateTime<Utc>,
        platform: Platform,
        estimate: EnergyEstimate,
        url: String,
    ) -> Self {
        Self {
            id,
            timestamp,
            platform,
            energy_wh: estimate.energy_wh,
            carbon_g: estimate.carbon_g,
            tokens: estimate.tokens,
            url,
        }
    }
}
