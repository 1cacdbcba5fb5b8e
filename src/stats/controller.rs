use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{DailyEntry, Database, HistoryReport, PromptRecord, StatsSnapshot},
    estimator::estimate,
    events::{EventBus, TrackerEvent},
    sensing::Submission,
    settings::{SettingsPatch, SettingsStore, TrackerSettings},
    utils::lock,
};

use super::badge::Badge;
use super::schedule::until_next_local_midnight;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "stats";

use crate::{log_debug, log_error, log_info, log_warn};

/// Prompt log entries older than this are dropped by the cleanup.
pub const EVENT_RETENTION_DAYS: i64 = 30;
const CLEANUP_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const RECENT_PROMPTS: usize = 50;

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Accumulates submissions into session and lifetime counters.
///
/// Every counter change goes to the database first; when that fails the
/// change is still applied to the in-memory copy so the overlay keeps
/// counting.
#[derive(Clone)]
pub struct StatsController {
    inner: Arc<StatsInner>,
}

struct StatsInner {
    db: Database,
    settings: Arc<SettingsStore>,
    events: EventBus,
    cache: Mutex<StatsSnapshot>,
}

impl StatsController {
    /// Load stored counters, catching up a rollover missed while nothing was
    /// running, and drop expired prompt events.
    pub async fn load(db: Database, settings: Arc<SettingsStore>, events: EventBus) -> Result<Self> {
        let now = Utc::now();
        let today = local_today();
        let snapshot = db
            .load_stats(now, today)
            .await
            .context("failed to load stats")?;

        let controller = Self {
            inner: Arc::new(StatsInner {
                db,
                settings,
                events,
                cache: Mutex::new(snapshot.clone()),
            }),
        };

        if snapshot.session_date < today {
            log_info!(
                "session from {} was never rolled over, closing it now",
                snapshot.session_date
            );
            if let Err(err) = controller.daily_rollover_at(now, today).await {
                log_warn!("catch-up rollover failed: {err:#}");
            }
        }

        if let Err(err) = controller.cleanup_old_events().await {
            log_warn!("start-up cleanup failed: {err:#}");
        }

        controller.publish_badge(controller.get_stats().session.energy_wh);
        Ok(controller)
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        lock(&self.inner.cache).clone()
    }

    pub fn settings(&self) -> TrackerSettings {
        self.inner.settings.get()
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<TrackerSettings> {
        let updated = self.inner.settings.update(patch)?;
        log_info!("settings updated");
        Ok(updated)
    }

    /// Estimate a detected submission and record it against `origin`.
    pub async fn record_detected(&self, submission: Submission, origin: &str) -> StatsSnapshot {
        let record = PromptRecord::new(
            submission.id.to_string(),
            submission.detected_at,
            submission.platform,
            estimate(&submission.text, submission.platform),
            origin.to_string(),
        );
        self.record_submission(record).await
    }

    /// Never fails: a store error is logged and only the in-memory counters
    /// move.
    pub async fn record_submission(&self, record: PromptRecord) -> StatsSnapshot {
        let snapshot = match self
            .inner
            .db
            .record_prompt(record.clone(), local_today())
            .await
        {
            Ok(stored) => {
                *lock(&self.inner.cache) = stored.clone();
                stored
            }
            Err(err) => {
                log_error!("failed to persist prompt {}: {err:#}", record.id);
                let mut cache = lock(&self.inner.cache);
                cache.record(&record);
                cache.clone()
            }
        };

        log_info!(
            "prompt recorded: {:.4} Wh, {} tokens on {} (session total {:.4} Wh)",
            record.energy_wh,
            record.tokens,
            record.platform,
            snapshot.session.energy_wh
        );

        self.inner.events.emit(TrackerEvent::PromptSubmitted {
            record: record.clone(),
        });

        let settings = self.inner.settings.get();
        if settings.enable_notifications && record.energy_wh > settings.energy_threshold {
            self.inner.events.emit(TrackerEvent::HighEnergy {
                title: "⚠️ High Energy Prompt".to_string(),
                message: format!(
                    "This prompt used {:.2} Wh ({:.2} g CO₂). Consider shortening it!",
                    record.energy_wh, record.carbon_g
                ),
            });
        }

        self.publish_badge(snapshot.session.energy_wh);
        self.publish_stats(&snapshot);
        snapshot
    }

    /// Never fails, like `record_submission`.
    pub async fn record_energy_saved(&self, amount_wh: f64) -> StatsSnapshot {
        let now = Utc::now();
        let snapshot = match self
            .inner
            .db
            .add_energy_saved(amount_wh, now, local_today())
            .await
        {
            Ok(stored) => {
                *lock(&self.inner.cache) = stored.clone();
                stored
            }
            Err(err) => {
                log_error!("failed to persist {amount_wh:.4} Wh saved: {err:#}");
                let mut cache = lock(&self.inner.cache);
                cache.add_energy_saved(amount_wh, now);
                cache.clone()
            }
        };

        self.inner.events.emit(TrackerEvent::EnergySaved {
            amount_wh,
            total_wh: snapshot.energy_saved_wh,
        });
        self.publish_stats(&snapshot);
        snapshot
    }

    /// Never fails; on a store error only the in-memory session is cleared.
    pub async fn reset_session(&self) -> StatsSnapshot {
        let now = Utc::now();
        let today = local_today();
        let snapshot = match self.inner.db.reset_session(now, today).await {
            Ok(stored) => {
                *lock(&self.inner.cache) = stored.clone();
                stored
            }
            Err(err) => {
                log_error!("failed to persist session reset: {err:#}");
                let mut cache = lock(&self.inner.cache);
                cache.reset_session(now, today);
                cache.clone()
            }
        };

        log_info!("session stats reset");
        self.publish_badge(0.0);
        self.publish_stats(&snapshot);
        snapshot
    }

    /// Close the session into the history and start a new one, unless the
    /// session already belongs to today.
    pub async fn daily_rollover(&self) -> Result<Option<DailyEntry>> {
        self.rollover_if_due_at(Utc::now(), local_today()).await
    }

    /// The history entry is labelled with the day the session counters
    /// belong to, which at midnight is the day that just ended.
    pub async fn daily_rollover_at(
        &self,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<DailyEntry> {
        let label = lock(&self.inner.cache).session_date;
        let (entry, snapshot) = self
            .inner
            .db
            .roll_over_session(label, now, today)
            .await
            .context("failed to roll over daily stats")?;
        *lock(&self.inner.cache) = snapshot.clone();

        log_info!(
            "rolled over {}: {} prompts, {:.4} Wh",
            entry.date,
            entry.prompts,
            entry.energy_wh
        );
        self.publish_badge(0.0);
        self.publish_stats(&snapshot);
        Ok(entry)
    }

    /// Roll over only once the local day has moved past the session's day.
    /// The midnight timer runs on the monotonic clock and can wake slightly
    /// before the wall clock reaches midnight.
    pub async fn rollover_if_due_at(
        &self,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<Option<DailyEntry>> {
        let session_date = lock(&self.inner.cache).session_date;
        if session_date >= today {
            log_debug!("midnight timer woke early, session {session_date} still current");
            return Ok(None);
        }
        self.daily_rollover_at(now, today).await.map(Some)
    }

    pub async fn daily_history(&self) -> Result<Vec<DailyEntry>> {
        self.inner.db.daily_history().await
    }

    /// Per-day totals of the prompts from the last `days` days (UTC calendar
    /// days, oldest first) plus the latest prompts in that window.
    pub async fn get_history(&self, days: u32) -> Result<HistoryReport> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let events = self
            .inner
            .db
            .prompt_events_since(cutoff)
            .await
            .context("failed to load prompt events")?;
        Ok(aggregate_history(events))
    }

    /// Number of prompt events kept in the log.
    pub async fn prompt_event_count(&self) -> Result<u64> {
        self.inner.db.count_prompt_events().await
    }

    pub async fn cleanup_old_events(&self) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(EVENT_RETENTION_DAYS);
        let removed = self.inner.db.delete_prompt_events_before(cutoff).await?;
        if removed > 0 {
            log_info!("removed {removed} prompt events older than {EVENT_RETENTION_DAYS} days");
        }
        Ok(removed)
    }

    /// Feed detected submissions into the counters until the channel closes
    /// or `cancel_token` fires. Submissions already queued at cancellation
    /// are still recorded.
    pub async fn run_submissions(
        &self,
        mut submissions: mpsc::UnboundedReceiver<Submission>,
        origin: String,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    while let Ok(submission) = submissions.try_recv() {
                        self.record_detected(submission, &origin).await;
                    }
                    break;
                }
                next = submissions.recv() => match next {
                    Some(submission) => {
                        self.record_detected(submission, &origin).await;
                    }
                    None => break,
                },
            }
        }
        log_info!("submission consumer stopped");
    }

    /// Daily rollover at each local midnight and the weekly event cleanup.
    pub fn spawn_maintenance(&self, cancel_token: CancellationToken) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut cleanup = time::interval_at(Instant::now() + CLEANUP_PERIOD, CLEANUP_PERIOD);
            cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let until_midnight = until_next_local_midnight();
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => break,
                    _ = time::sleep(until_midnight) => {
                        if let Err(err) = controller.daily_rollover().await {
                            log_error!("daily rollover failed: {err:#}");
                        }
                    }
                    _ = cleanup.tick() => {
                        if let Err(err) = controller.cleanup_old_events().await {
                            log_error!("prompt event cleanup failed: {err:#}");
                        }
                    }
                }
            }
            log_info!("maintenance stopped");
        })
    }

    fn publish_badge(&self, session_energy_wh: f64) {
        self.inner.events.emit(TrackerEvent::BadgeChanged {
            badge: Badge::for_session_energy(session_energy_wh),
        });
    }

    fn publish_stats(&self, snapshot: &StatsSnapshot) {
        self.inner.events.emit(TrackerEvent::StatsUpdated {
            stats: snapshot.clone(),
        });
    }
}

fn aggregate_history(events: Vec<PromptRecord>) -> HistoryReport {
    let mut days: Vec<DailyEntry> = Vec::new();
    for event in &events {
        let date = event.timestamp.date_naive();
        let index = match days.iter().position(|day| day.date == date) {
            Some(index) => index,
            None => {
                days.push(DailyEntry::empty(date));
                days.len() - 1
            }
        };
        let day = &mut days[index];
        day.energy_wh += event.energy_wh;
        day.carbon_g += event.carbon_g;
        day.prompts += 1;
    }
    days.sort_by_key(|day| day.date);

    let skip = events.len().saturating_sub(RECENT_PROMPTS);
    let recent = events.into_iter().skip(skip).collect();

    HistoryReport { days, recent }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use chrono::TimeZone;
    use tokio::sync::broadcast;

    struct Fixture {
        _dir: tempfile::TempDir,
        stats: StatsController,
        events: broadcast::Receiver<TrackerEvent>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("meter.db")).unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let bus = EventBus::default();
        let events = bus.subscribe();
        let stats = StatsController::load(db, settings, bus).await.unwrap();
        Fixture {
            _dir: dir,
            stats,
            events,
        }
    }

    fn record(id: &str, energy_wh: f64) -> PromptRecord {
        PromptRecord {
            id: id.to_string(),
            timestamp: Utc::now(),
            platform: Platform::Chatgpt,
            energy_wh,
            carbon_g: energy_wh / 2.0,
            tokens: 12,
            url: "chatgpt.com".to_string(),
        }
    }

    fn drain(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn submissions_accumulate_and_publish() {
        let mut fx = fixture().await;
        drain(&mut fx.events);

        fx.stats.record_submission(record("a", 0.4)).await;
        let snapshot = fx.stats.record_submission(record("b", 0.8)).await;

        assert_eq!(snapshot.session.prompts, 2);
        assert!((snapshot.session.energy_wh - 1.2).abs() < 1e-9);
        assert_eq!(fx.stats.get_stats(), snapshot);

        let events = drain(&mut fx.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, TrackerEvent::PromptSubmitted { record } if record.id == "b")));
        let last_badge = events
            .iter()
            .rev()
            .find_map(|e| match e {
                TrackerEvent::BadgeChanged { badge } => Some(badge.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_badge.text, "1.2");
        assert!(!events.iter().any(|e| matches!(e, TrackerEvent::HighEnergy { .. })));
    }

    #[tokio::test]
    async fn notifies_above_threshold_when_enabled() {
        let mut fx = fixture().await;
        drain(&mut fx.events);

        fx.stats.record_submission(record("big", 6.0)).await;
        let events = drain(&mut fx.events);
        let message = events
            .iter()
            .find_map(|e| match e {
                TrackerEvent::HighEnergy { message, .. } => Some(message.clone()),
                _ => None,
            })
            .unwrap();
        assert!(message.contains("6.00 Wh"));

        fx.stats
            .update_settings(SettingsPatch {
                enable_notifications: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
        fx.stats.record_submission(record("big-again", 6.0)).await;
        let events = drain(&mut fx.events);
        assert!(!events.iter().any(|e| matches!(e, TrackerEvent::HighEnergy { .. })));
    }

    #[tokio::test]
    async fn energy_saved_and_reset() {
        let fx = fixture().await;
        fx.stats.record_submission(record("a", 2.0)).await;
        let saved = fx.stats.record_energy_saved(0.5).await;
        assert!((saved.energy_saved_wh - 0.5).abs() < 1e-9);

        let reset = fx.stats.reset_session().await;
        assert_eq!(reset.session.prompts, 0);
        assert_eq!(reset.lifetime.prompts, 1);
        assert!((reset.energy_saved_wh - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rollover_moves_session_into_history() {
        let fx = fixture().await;
        fx.stats.record_submission(record("a", 1.0)).await;
        let session_day = fx.stats.get_stats().session_date;

        let next_day = session_day.succ_opt().unwrap();
        let midnight = Utc.from_utc_datetime(&next_day.and_hms_opt(0, 0, 0).unwrap());
        let entry = fx.stats.daily_rollover_at(midnight, next_day).await.unwrap();

        assert_eq!(entry.date, session_day);
        assert_eq!(entry.prompts, 1);
        let stats = fx.stats.get_stats();
        assert_eq!(stats.session.prompts, 0);
        assert_eq!(stats.session_date, next_day);
        assert_eq!(fx.stats.daily_history().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn store_failures_keep_counting_in_memory() {
        let mut fx = fixture().await;
        fx.stats.record_submission(record("a", 1.0)).await;
        fx.stats
            .inner
            .db
            .execute(|conn| Ok(conn.execute_batch("DROP TABLE stats")?))
            .await
            .unwrap();
        drain(&mut fx.events);

        let recorded = fx.stats.record_submission(record("b", 2.0)).await;
        assert_eq!(recorded.session.prompts, 2);
        assert_eq!(recorded.lifetime.prompts, 2);

        let saved = fx.stats.record_energy_saved(0.5).await;
        assert!((saved.energy_saved_wh - 0.5).abs() < 1e-9);
        assert_eq!(saved.session.prompts, 2);

        let events = drain(&mut fx.events);
        assert!(events.iter().any(|e| matches!(
            e,
            TrackerEvent::EnergySaved { total_wh, .. } if (*total_wh - 0.5).abs() < 1e-9
        )));

        let reset = fx.stats.reset_session().await;
        assert_eq!(reset.session.prompts, 0);
        assert_eq!(reset.lifetime.prompts, 2);
        assert_eq!(fx.stats.get_stats(), reset);
    }

    #[tokio::test]
    async fn early_midnight_wakeup_does_not_roll_over() {
        let fx = fixture().await;
        fx.stats.record_submission(record("a", 1.0)).await;
        let session_day = fx.stats.get_stats().session_date;

        let just_before = Utc.from_utc_datetime(&session_day.and_hms_opt(23, 59, 59).unwrap());
        let skipped = fx
            .stats
            .rollover_if_due_at(just_before, session_day)
            .await
            .unwrap();
        assert!(skipped.is_none());
        assert_eq!(fx.stats.get_stats().session.prompts, 1);
        assert!(fx.stats.daily_history().await.unwrap().is_empty());

        let next_day = session_day.succ_opt().unwrap();
        let midnight = Utc.from_utc_datetime(&next_day.and_hms_opt(0, 0, 0).unwrap());
        let entry = fx
            .stats
            .rollover_if_due_at(midnight, next_day)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.date, session_day);
        assert_eq!(entry.prompts, 1);

        // A second wakeup on the same day finds nothing to close.
        assert!(fx
            .stats
            .rollover_if_due_at(midnight, next_day)
            .await
            .unwrap()
            .is_none());
        assert_eq!(fx.stats.daily_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_groups_recent_prompts_by_day() {
        let fx = fixture().await;
        let mut first = record("a", 1.0);
        first.timestamp = Utc::now() - chrono::Duration::seconds(2);
        fx.stats.record_submission(first).await;
        fx.stats.record_submission(record("b", 2.0)).await;

        let report = fx.stats.get_history(7).await.unwrap();
        let total: u64 = report.days.iter().map(|d| d.prompts).sum();
        assert_eq!(total, 2);
        assert_eq!(report.recent.len(), 2);
        assert_eq!(report.recent[1].id, "b");
    }

    #[test]
    fn aggregate_sorts_days_and_keeps_latest_prompts() {
        let day_one = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let day_two = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let mut events = Vec::new();
        for i in 0..60 {
            let mut event = record(&format!("p{i}"), 0.1);
            event.timestamp = if i < 10 { day_one } else { day_two };
            events.push(event);
        }

        let report = aggregate_history(events);
        assert_eq!(report.days.len(), 2);
        assert_eq!(report.days[0].prompts, 10);
        assert_eq!(report.days[1].prompts, 50);
        assert_eq!(report.recent.len(), RECENT_PROMPTS);
        assert_eq!(report.recent[0].id, "p10");
    }
}
