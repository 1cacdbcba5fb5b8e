use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::PromptRecord;

/// Totals for one local calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub energy_wh: f64,
    pub carbon_g: f64,
    pub prompts: u64,
}

impl DailyEntry {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            energy_wh: 0.0,
            carbon_g: 0.0,
            prompts: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryReport {
    /// Per-day aggregates, oldest first.
    pub days: Vec<DailyEntry>,
    /// The latest prompts in the window, oldest first.
    pub recent: Vec<PromptRecord>,
}
