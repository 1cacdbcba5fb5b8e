pub mod history;
pub mod prompt;
pub mod stats;

pub use history::{DailyEntry, HistoryReport};
pub use prompt::PromptRecord;
pub use stats::{StatsSnapshot, UsageTotals};
