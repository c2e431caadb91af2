use crate::config::Config;
use crate::dashboard::{HistoryWindow, RECENT_LOG_LIMIT, totals_for_day};
use crate::db::{
    CoreTaskRow, DailySummaryRow, Database, DivertedTaskRow, ProfileRow, TaskLogDetailRow,
    day_bounds,
};
use crate::metrics::{DailyTotals, break_minutes, current_status};
use crate::model::{LogType, WorkStatus};
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TodayStats {
    pub core_minutes: i64,
    pub diverted_minutes: i64,
    pub break_minutes: i64,
    pub total_minutes: i64,
    pub target_minutes: i64,
    pub productivity: u32,
    pub utilization: u32,
}

impl TodayStats {
    fn new(totals: DailyTotals, break_minutes: i64, target_minutes: i64) -> Self {
        Self {
            core_minutes: totals.core_minutes,
            diverted_minutes: totals.diverted_minutes,
            break_minutes,
            total_minutes: totals.total_minutes,
            target_minutes,
            productivity: totals.productivity(),
            utilization: totals.utilization(target_minutes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub status: WorkStatus,
    pub label: &'static str,
    pub allowed_actions: Vec<LogType>,
    pub since: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AgentDashboard {
    pub profile: ProfileRow,
    pub status: StatusView,
    pub today: TodayStats,
    pub core_tasks: Vec<CoreTaskRow>,
    pub diverted_task_types: Vec<String>,
    pub history_days: u32,
    pub history: Vec<DailySummaryRow>,
    pub recent_task_logs: Vec<TaskLogDetailRow>,
    pub recent_diverted_logs: Vec<DivertedTaskRow>,
}

pub fn load(
    database: &Database,
    config: &Config,
    profile: &ProfileRow,
    window: HistoryWindow,
    now: DateTime<Local>,
) -> Result<AgentDashboard> {
    let today = now.date_naive();
    let (day_start, day_end) = day_bounds(today)?;

    let totals = totals_for_day(database, &profile.id, today)?;
    let todays_time_logs = database.time_logs_between(&profile.id, day_start, day_end)?;
    let breaks = break_minutes(&todays_time_logs, now.timestamp());

    let (history_from, history_to) = window.date_range(today);
    let since = window.since_timestamp(now);

    Ok(AgentDashboard {
        profile: profile.clone(),
        status: status_view(database, &profile.id)?,
        today: TodayStats::new(totals, breaks, config.target_minutes),
        core_tasks: database.core_tasks()?,
        diverted_task_types: config.diverted_task_types.clone(),
        history_days: window.days,
        history: database.daily_summaries(Some(&profile.id), history_from, history_to)?,
        recent_task_logs: database.recent_task_logs(&profile.id, since, RECENT_LOG_LIMIT)?,
        recent_diverted_logs: database.recent_diverted_tasks(
            &profile.id,
            since,
            RECENT_LOG_LIMIT,
        )?,
    })
}

pub fn status_view(database: &Database, user_id: &str) -> Result<StatusView> {
    let latest = database.latest_time_log(user_id)?.into_iter().collect::<Vec<_>>();
    let status = current_status(&latest);

    Ok(StatusView {
        status,
        label: status.label(),
        allowed_actions: status.allowed_actions().to_vec(),
        since: latest.first().map(|log| log.timestamp),
    })
}
