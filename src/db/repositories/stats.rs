use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_date, format_timestamp, parse_date, parse_datetime, to_i64, to_u64},
    models::{DailyEntry, PromptRecord, StatsSnapshot, UsageTotals},
};

use super::{MAX_HISTORY_ENTRIES, MAX_PROMPT_EVENTS};

fn row_to_stats(row: &Row, fallback_date: NaiveDate) -> Result<StatsSnapshot> {
    let install_date: String = row.get("install_date")?;
    let last_updated: String = row.get("last_updated")?;
    let session_date: Option<String> = row.get("session_date")?;

    Ok(StatsSnapshot {
        session: UsageTotals {
            energy_wh: row.get("session_energy")?,
            carbon_g: row.get("session_carbon")?,
            prompts: to_u64(row.get("total_prompts")?, "total_prompts")?,
        },
        lifetime: UsageTotals {
            energy_wh: row.get("lifetime_energy")?,
            carbon_g: row.get("lifetime_carbon")?,
            prompts: to_u64(row.get("lifetime_prompts")?, "lifetime_prompts")?,
        },
        energy_saved_wh: row.get("energy_saved")?,
        install_date: parse_datetime(&install_date, "install_date")?,
        last_updated: parse_datetime(&last_updated, "last_updated")?,
        session_date: match session_date {
            Some(raw) => parse_date(&raw, "session_date")?,
            None => fallback_date,
        },
    })
}

/// Read the single stats row, creating it on first use.
fn read_stats(conn: &Connection, now: DateTime<Utc>, today: NaiveDate) -> Result<StatsSnapshot> {
    conn.execute(
        "INSERT OR IGNORE INTO stats (id, install_date, last_updated, session_date)
         VALUES (1, ?1, ?1, ?2)",
        params![format_timestamp(now), format_date(today)],
    )
    .context("failed to create stats row")?;

    let mut stmt = conn.prepare(
        "SELECT session_energy, session_carbon, total_prompts, energy_saved,
                lifetime_energy, lifetime_carbon, lifetime_prompts,
                install_date, last_updated, session_date
         FROM stats
         WHERE id = 1",
    )?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => row_to_stats(row, today),
        None => Err(anyhow!("stats row missing after insert")),
    }
}

fn clear_session(conn: &Connection, now: DateTime<Utc>, today: NaiveDate) -> Result<()> {
    conn.execute(
        "UPDATE stats
         SET session_energy = 0,
             session_carbon = 0,
             total_prompts = 0,
             session_date = ?1,
             last_updated = ?2
         WHERE id = 1",
        params![format_date(today), format_timestamp(now)],
    )
    .context("failed to reset session counters")?;
    Ok(())
}

impl Database {
    pub async fn load_stats(&self, now: DateTime<Utc>, today: NaiveDate) -> Result<StatsSnapshot> {
        self.execute(move |conn| read_stats(conn, now, today)).await
    }

    /// Add one prompt to the session and lifetime counters and log it, in a
    /// single transaction. Returns the updated counters.
    pub async fn record_prompt(
        &self,
        record: PromptRecord,
        today: NaiveDate,
    ) -> Result<StatsSnapshot> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            read_stats(&tx, record.timestamp, today)?;

            tx.execute(
                "UPDATE stats
                 SET session_energy = session_energy + ?1,
                     session_carbon = session_carbon + ?2,
                     total_prompts = total_prompts + 1,
                     lifetime_energy = lifetime_energy + ?1,
                     lifetime_carbon = lifetime_carbon + ?2,
                     lifetime_prompts = lifetime_prompts + 1,
                     last_updated = ?3
                 WHERE id = 1",
                params![
                    record.energy_wh,
                    record.carbon_g,
                    format_timestamp(record.timestamp)
                ],
            )
            .context("failed to update stats counters")?;

            tx.execute(
                "INSERT INTO prompt_events (id, timestamp, platform, energy, carbon, tokens, url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    format_timestamp(record.timestamp),
                    record.platform.as_str(),
                    record.energy_wh,
                    record.carbon_g,
                    to_i64(record.tokens)?,
                    record.url,
                ],
            )
            .context("failed to insert prompt event")?;

            tx.execute(
                "DELETE FROM prompt_events
                 WHERE id NOT IN (
                     SELECT id FROM prompt_events ORDER BY timestamp DESC LIMIT ?1
                 )",
                params![to_i64(MAX_PROMPT_EVENTS as u64)?],
            )
            .context("failed to trim prompt events")?;

            let snapshot = read_stats(&tx, record.timestamp, today)?;
            tx.commit().context("failed to commit prompt record")?;
            Ok(snapshot)
        })
        .await
    }

    pub async fn add_energy_saved(
        &self,
        amount_wh: f64,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<StatsSnapshot> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            read_stats(&tx, now, today)?;
            tx.execute(
                "UPDATE stats
                 SET energy_saved = energy_saved + ?1,
                     last_updated = ?2
                 WHERE id = 1",
                params![amount_wh, format_timestamp(now)],
            )
            .context("failed to update energy saved")?;
            let snapshot = read_stats(&tx, now, today)?;
            tx.commit()?;
            Ok(snapshot)
        })
        .await
    }

    pub async fn reset_session(&self, now: DateTime<Utc>, today: NaiveDate) -> Result<StatsSnapshot> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            read_stats(&tx, now, today)?;
            clear_session(&tx, now, today)?;
            let snapshot = read_stats(&tx, now, today)?;
            tx.commit()?;
            Ok(snapshot)
        })
        .await
    }

    /// Close the current session as a history entry labelled `date`, trim the
    /// history, and start a fresh session for `today`.
    pub async fn roll_over_session(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<(DailyEntry, StatsSnapshot)> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let current = read_stats(&tx, now, today)?;
            let entry = DailyEntry {
                date,
                energy_wh: current.session.energy_wh,
                carbon_g: current.session.carbon_g,
                prompts: current.session.prompts,
            };

            tx.execute(
                "INSERT INTO daily_history (date, energy, carbon, prompts)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    format_date(entry.date),
                    entry.energy_wh,
                    entry.carbon_g,
                    to_i64(entry.prompts)?,
                ],
            )
            .context("failed to append daily history")?;

            tx.execute(
                "DELETE FROM daily_history
                 WHERE id NOT IN (
                     SELECT id FROM daily_history ORDER BY id DESC LIMIT ?1
                 )",
                params![to_i64(MAX_HISTORY_ENTRIES as u64)?],
            )
            .context("failed to trim daily history")?;

            clear_session(&tx, now, today)?;
            let snapshot = read_stats(&tx, now, today)?;
            tx.commit().context("failed to commit rollover")?;
            Ok((entry, snapshot))
        })
        .await
    }
}
