mod history;
mod prompt_events;
mod stats;

/// Prompt log entries kept; older ones are trimmed on insert.
pub const MAX_PROMPT_EVENTS: usize = 1000;

/// Daily history entries kept.
pub const MAX_HISTORY_ENTRIES: usize = 30;
