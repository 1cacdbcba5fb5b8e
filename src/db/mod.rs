mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{DailyEntry, HistoryReport, PromptRecord, StatsSnapshot, UsageTotals};
pub use repositories::{MAX_HISTORY_ENTRIES, MAX_PROMPT_EVENTS};
