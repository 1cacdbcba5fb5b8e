use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, parse_datetime, to_u64},
    models::PromptRecord,
};
use crate::platform::Platform;

fn row_to_record(row: &Row) -> Result<PromptRecord> {
    let timestamp: String = row.get("timestamp")?;
    let platform: String = row.get("platform")?;

    Ok(PromptRecord {
        id: row.get("id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        platform: Platform::parse(&platform),
        energy_wh: row.get("energy")?,
        carbon_g: row.get("carbon")?,
        tokens: to_u64(row.get("tokens")?, "tokens")?,
        url: row.get("url")?,
    })
}

impl Database {
    /// Events at or after `cutoff`, oldest first.
    pub async fn prompt_events_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<PromptRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, platform, energy, carbon, tokens, url
                 FROM prompt_events
                 WHERE timestamp >= ?1
                 ORDER BY timestamp ASC",
            )?;

            let mut rows = stmt.query(params![format_timestamp(cutoff)])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }

            Ok(records)
        })
        .await
    }

    /// Returns how many events were removed.
    pub async fn delete_prompt_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM prompt_events WHERE timestamp < ?1",
                params![format_timestamp(cutoff)],
            )
            .context("failed to delete old prompt events")
        })
        .await
    }

    pub async fn count_prompt_events(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM prompt_events", [], |row| row.get(0))?;
            to_u64(count, "count")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MAX_PROMPT_EVENTS;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("meter.db")).unwrap();
        (dir, db)
    }

    fn record(index: i64, at: DateTime<Utc>) -> PromptRecord {
        PromptRecord {
            id: format!("prompt-{index}"),
            timestamp: at,
            platform: Platform::Gemini,
            energy_wh: 0.01,
            carbon_g: 0.005,
            tokens: 50,
            url: "gemini.google.com".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn events_since_cutoff_read_back_oldest_first() {
        let (_dir, db) = database();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for i in 0..3 {
            db.record_prompt(record(i, base + Duration::minutes(i)), today())
                .await
                .unwrap();
        }

        let since = db
            .prompt_events_since(base + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0], record(1, base + Duration::minutes(1)));
        assert_eq!(since[1].id, "prompt-2");
        assert_eq!(since[1].platform, Platform::Gemini);
        assert_eq!(db.count_prompt_events().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn log_is_capped() {
        let (_dir, db) = database();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let total = MAX_PROMPT_EVENTS as i64 + 3;
        for i in 0..total {
            db.record_prompt(record(i, base + Duration::seconds(i)), today())
                .await
                .unwrap();
        }

        assert_eq!(db.count_prompt_events().await.unwrap(), MAX_PROMPT_EVENTS as u64);
        let oldest = db.prompt_events_since(base).await.unwrap();
        assert_eq!(oldest[0].id, "prompt-3");
    }

    #[tokio::test]
    async fn cleanup_drops_events_before_cutoff() {
        let (_dir, db) = database();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        db.record_prompt(record(0, base - Duration::days(40)), today())
            .await
            .unwrap();
        db.record_prompt(record(1, base), today()).await.unwrap();

        let removed = db
            .delete_prompt_events_before(base - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = db.prompt_events_since(base - Duration::days(365)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "prompt-1");
    }
}
