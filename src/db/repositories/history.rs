use anyhow::Result;
use rusqlite::Row;

use crate::db::{
    connection::Database,
    helpers::{parse_date, to_u64},
    models::DailyEntry,
};

fn row_to_entry(row: &Row) -> Result<DailyEntry> {
    let date: String = row.get("date")?;
    Ok(DailyEntry {
        date: parse_date(&date, "date")?,
        energy_wh: row.get("energy")?,
        carbon_g: row.get("carbon")?,
        prompts: to_u64(row.get("prompts")?, "prompts")?,
    })
}

impl Database {
    /// Rolled-over days, oldest first.
    pub async fn daily_history(&self) -> Result<Vec<DailyEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date, energy, carbon, prompts
                 FROM daily_history
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }
}
