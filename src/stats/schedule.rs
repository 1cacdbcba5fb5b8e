use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Time left until the next local midnight. Falls back to a full day when
/// the local calendar has no such instant.
pub(crate) fn until_next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest());

    match next {
        Some(next) => (next - now).to_std().unwrap_or(DAY),
        None => DAY,
    }
}

pub(crate) fn until_next_local_midnight() -> Duration {
    until_next_midnight(Local::now())
}
