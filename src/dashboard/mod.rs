pub mod admin;
pub mod agent;

use crate::config::Config;
use crate::dashboard::admin::AdminDashboard;
use crate::dashboard::agent::AgentDashboard;
use crate::db::{Database, ProfileRow, day_bounds};
use crate::metrics::{DailyTotals, daily_totals};
use crate::model::Role;
use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Local, NaiveDate};
use serde::Serialize;

pub const HISTORY_DAY_CHOICES: [u32; 3] = [7, 14, 30];
pub const RECENT_LOG_LIMIT: usize = 20;

/// Look-back window for history tables: `today - days ..= today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryWindow {
    pub days: u32,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self { days: 7 }
    }
}

impl HistoryWindow {
    pub fn from_days(days: Option<u32>) -> Result<Self> {
        match days {
            None => Ok(Self::default()),
            Some(days) if HISTORY_DAY_CHOICES.contains(&days) => Ok(Self { days }),
            Some(days) => bail!("Unsupported history window: {days} days. Use 7, 14 or 30"),
        }
    }

    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today - Duration::days(i64::from(self.days)), today)
    }

    pub fn since_timestamp(&self, now: DateTime<Local>) -> i64 {
        (now - Duration::days(i64::from(self.days))).timestamp()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DashboardQuery {
    pub window: HistoryWindow,
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Dashboard {
    Agent(Box<AgentDashboard>),
    Admin(Box<AdminDashboard>),
}

pub fn load_dashboard(
    database: &Database,
    config: &Config,
    profile: &ProfileRow,
    query: &DashboardQuery,
    now: DateTime<Local>,
) -> Result<Dashboard> {
    match profile.role {
        Role::Admin => Ok(Dashboard::Admin(Box::new(admin::load(
            database, config, profile, query, now,
        )?))),
        Role::Agent => Ok(Dashboard::Agent(Box::new(agent::load(
            database,
            config,
            profile,
            query.window,
            now,
        )?))),
    }
}

pub fn totals_for_day(database: &Database, user_id: &str, date: NaiveDate) -> Result<DailyTotals> {
    let (from_ts, to_ts) = day_bounds(date)?;
    let task_logs = database.task_logs_between(user_id, from_ts, to_ts)?;
    let diverted_logs = database.diverted_tasks_between(user_id, from_ts, to_ts)?;

    Ok(daily_totals(&task_logs, &diverted_logs))
}
