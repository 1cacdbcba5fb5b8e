use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::PromptRecord;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub energy_wh: f64,
    pub carbon_g: f64,
    pub prompts: u64,
}

impl UsageTotals {
    pub fn add(&mut self, record: &PromptRecord) {
        self.energy_wh += record.energy_wh;
        self.carbon_g += record.carbon_g;
        self.prompts += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub session: UsageTotals,
    pub lifetime: UsageTotals,
    pub energy_saved_wh: f64,
    pub install_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Local day the session counters belong to.
    pub session_date: NaiveDate,
}

impl StatsSnapshot {
    pub fn record(&mut self, record: &PromptRecord) {
        self.session.add(record);
        self.lifetime.add(record);
        self.last_updated = record.timestamp;
    }

    pub fn add_energy_saved(&mut self, amount_wh: f64, now: DateTime<Utc>) {
        self.energy_saved_wh += amount_wh;
        self.last_updated = now;
    }

    pub fn reset_session(&mut self, now: DateTime<Utc>, today: NaiveDate) {
        self.session = UsageTotals::default();
        self.session_date = today;
        self.last_updated = now;
    }
}
