use crate::db::{Database, day_bounds};
use crate::metrics::daily_totals;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct RollupOutcome {
    pub date: String,
    pub written: usize,
    pub skipped: usize,
}

/// Profiles that logged nothing that day get no row and lose a stale one.
pub fn rollup_day(database: &Database, date: NaiveDate, target_minutes: i64) -> Result<RollupOutcome> {
    let (from_ts, to_ts) = day_bounds(date)?;
    let profiles = database.list_profiles()?;

    let (written, skipped) = profiles.iter().try_fold((0_usize, 0_usize), |(written, skipped), profile| {
        let task_logs = database.task_logs_between(&profile.id, from_ts, to_ts)?;
        let diverted_logs = database.diverted_tasks_between(&profile.id, from_ts, to_ts)?;
        let totals = daily_totals(&task_logs, &diverted_logs);

        if totals.total_minutes == 0 {
            database.delete_daily_summary(date, &profile.id)?;
            return Ok::<_, anyhow::Error>((written, skipped + 1));
        }

        database.upsert_daily_summary(&totals.into_summary(date, &profile.id, target_minutes))?;
        Ok((written + 1, skipped))
    })?;

    info!(date = %date, written, skipped, "daily summaries rolled up");

    Ok(RollupOutcome {
        date: date.format("%Y-%m-%d").to_string(),
        written,
        skipped,
    })
}
