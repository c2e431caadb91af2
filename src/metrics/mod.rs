pub mod rollup;

use crate::db::{DailySummaryRow, DivertedTaskRow, ProfileRow, TaskLogRow, TimeLogRow};
use crate::model::{LogType, WorkStatus};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    pub core_minutes: i64,
    pub diverted_minutes: i64,
    pub total_minutes: i64,
}

impl DailyTotals {
    pub fn new(core_minutes: i64, diverted_minutes: i64) -> Self {
        let core_minutes = core_minutes.max(0);
        let diverted_minutes = diverted_minutes.max(0);

        Self {
            core_minutes,
            diverted_minutes,
            total_minutes: core_minutes.saturating_add(diverted_minutes),
        }
    }

    pub fn productivity(&self) -> u32 {
        productivity(self.core_minutes, self.total_minutes)
    }

    pub fn utilization(&self, target_minutes: i64) -> u32 {
        utilization(self.total_minutes, target_minutes)
    }

    pub fn into_summary(self, date: NaiveDate, user_id: &str, target_minutes: i64) -> DailySummaryRow {
        DailySummaryRow {
            date: date.format("%Y-%m-%d").to_string(),
            user_id: user_id.to_string(),
            core_minutes: self.core_minutes,
            diverted_minutes: self.diverted_minutes,
            total_minutes: self.total_minutes,
            productivity_percentage: self.productivity(),
            utilization_percentage: self.utilization(target_minutes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamTrend {
    pub date: String,
    pub avg_productivity: u32,
    pub avg_utilization: u32,
    pub total_core_minutes: i64,
    pub total_diverted_minutes: i64,
    pub active_agents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDayStats {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub is_active: bool,
    pub core_minutes: i64,
    pub diverted_minutes: i64,
    pub total_minutes: i64,
    pub productivity: u32,
    pub utilization: u32,
}

impl AgentDayStats {
    pub fn from_totals(profile: &ProfileRow, totals: DailyTotals, target_minutes: i64) -> Self {
        Self {
            id: profile.id.clone(),
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            is_active: profile.is_active,
            core_minutes: totals.core_minutes,
            diverted_minutes: totals.diverted_minutes,
            total_minutes: totals.total_minutes,
            productivity: totals.productivity(),
            utilization: totals.utilization(target_minutes),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamStats {
    pub total_agents: usize,
    pub active_agents: usize,
    pub avg_productivity: u32,
    pub avg_utilization: u32,
    pub total_core_minutes: i64,
    pub total_diverted_minutes: i64,
}

pub fn daily_totals(task_logs: &[TaskLogRow], diverted_logs: &[DivertedTaskRow]) -> DailyTotals {
    let core_minutes = saturating_sum(task_logs.iter().map(|log| log.time_spent));
    let diverted_minutes = saturating_sum(diverted_logs.iter().map(|log| log.time_spent));

    DailyTotals::new(core_minutes, diverted_minutes)
}

pub fn productivity(core_minutes: i64, total_minutes: i64) -> u32 {
    if total_minutes <= 0 {
        return 0;
    }

    percentage(core_minutes.clamp(0, total_minutes), total_minutes)
}

/// Logged time against the daily target. Not clamped: overtime reads above 100.
pub fn utilization(total_minutes: i64, target_minutes: i64) -> u32 {
    if target_minutes <= 0 {
        return 0;
    }

    percentage(total_minutes.max(0), target_minutes)
}

pub fn team_trend(rows: &[DailySummaryRow]) -> Vec<TeamTrend> {
    #[derive(Default)]
    struct DateBucket<'a> {
        productivity_sum: u64,
        utilization_sum: u64,
        rows: u64,
        core_minutes: i64,
        diverted_minutes: i64,
        agents: BTreeSet<&'a str>,
    }

    let buckets = rows.iter().fold(BTreeMap::new(), |mut acc, row| {
        let bucket: &mut DateBucket = acc.entry(row.date.as_str()).or_default();
        bucket.productivity_sum += u64::from(row.productivity_percentage);
        bucket.utilization_sum += u64::from(row.utilization_percentage);
        bucket.rows += 1;
        bucket.core_minutes = bucket.core_minutes.saturating_add(row.core_minutes);
        bucket.diverted_minutes = bucket.diverted_minutes.saturating_add(row.diverted_minutes);
        bucket.agents.insert(row.user_id.as_str());
        acc
    });

    buckets
        .into_iter()
        .rev()
        .map(|(date, bucket)| TeamTrend {
            date: date.to_string(),
            avg_productivity: rounded_mean(bucket.productivity_sum, bucket.rows),
            avg_utilization: rounded_mean(bucket.utilization_sum, bucket.rows),
            total_core_minutes: bucket.core_minutes,
            total_diverted_minutes: bucket.diverted_minutes,
            active_agents: bucket.agents.len(),
        })
        .collect()
}

/// Status implied by the newest time log. On equal timestamps the later row wins.
pub fn current_status(time_logs: &[TimeLogRow]) -> WorkStatus {
    let latest = time_logs.iter().max_by_key(|log| log.timestamp);
    WorkStatus::from_log_type(latest.map(|log| log.log_type))
}

pub fn break_minutes(time_logs: &[TimeLogRow], now: i64) -> i64 {
    let mut ordered = time_logs.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|log| log.timestamp);

    let (closed_seconds, open_since) =
        ordered
            .into_iter()
            .fold((0_i64, None::<i64>), |(seconds, open), log| {
                match (log.log_type, open) {
                    (LogType::BreakStart, None) => (seconds, Some(log.timestamp)),
                    (LogType::BreakEnd | LogType::WorkEnd, Some(started)) => {
                        (seconds + (log.timestamp - started).max(0), None)
                    }
                    (_, open) => (seconds, open),
                }
            });

    let open_seconds = open_since
        .map(|started| (now - started).max(0))
        .unwrap_or_default();

    (closed_seconds + open_seconds) / 60
}

/// Team-wide figures. Averages only cover active profiles; totals cover everyone.
pub fn team_snapshot(agents: &[AgentDayStats]) -> TeamStats {
    let active = agents
        .iter()
        .filter(|agent| agent.is_active)
        .collect::<Vec<_>>();
    let active_count = active.len() as u64;

    TeamStats {
        total_agents: agents.len(),
        active_agents: active.len(),
        avg_productivity: rounded_mean(
            active.iter().map(|agent| u64::from(agent.productivity)).sum(),
            active_count,
        ),
        avg_utilization: rounded_mean(
            active.iter().map(|agent| u64::from(agent.utilization)).sum(),
            active_count,
        ),
        total_core_minutes: saturating_sum(agents.iter().map(|agent| agent.core_minutes)),
        total_diverted_minutes: saturating_sum(agents.iter().map(|agent| agent.diverted_minutes)),
    }
}

fn saturating_sum(minutes: impl Iterator<Item = i64>) -> i64 {
    minutes.fold(0_i64, |acc, value| acc.saturating_add(value.max(0)))
}

fn percentage(part: i64, whole: i64) -> u32 {
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

fn rounded_mean(sum: u64, count: u64) -> u32 {
    if count == 0 {
        return 0;
    }

    (sum as f64 / count as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::{
        AgentDayStats, DailyTotals, break_minutes, current_status, daily_totals, productivity,
        team_snapshot, team_trend, utilization,
    };
    use crate::db::{DailySummaryRow, DivertedTaskRow, TaskLogRow, TimeLogRow};
    use crate::model::{LogType, WorkStatus};

    fn task_log(minutes: i64) -> TaskLogRow {
        TaskLogRow {
            id: 0,
            user_id: "u1".to_string(),
            core_task_id: 1,
            time_spent: minutes,
            notes: None,
            completed_at: 0,
        }
    }

    fn diverted(minutes: i64) -> DivertedTaskRow {
        DivertedTaskRow {
            id: 0,
            user_id: "u1".to_string(),
            task_type: "Meeting".to_string(),
            time_spent: minutes,
            description: None,
            completed_at: 0,
        }
    }

    fn time_log(log_type: LogType, timestamp: i64) -> TimeLogRow {
        TimeLogRow {
            id: 0,
            user_id: "u1".to_string(),
            log_type,
            timestamp,
        }
    }

    fn summary(date: &str, user: &str, core: i64, diverted: i64, prod: u32, util: u32) -> DailySummaryRow {
        DailySummaryRow {
            date: date.to_string(),
            user_id: user.to_string(),
            core_minutes: core,
            diverted_minutes: diverted,
            total_minutes: core + diverted,
            productivity_percentage: prod,
            utilization_percentage: util,
        }
    }

    fn agent(is_active: bool, core: i64, diverted: i64) -> AgentDayStats {
        let totals = DailyTotals::new(core, diverted);
        AgentDayStats {
            id: "u".to_string(),
            full_name: "Agent".to_string(),
            email: "agent@example.com".to_string(),
            is_active,
            core_minutes: totals.core_minutes,
            diverted_minutes: totals.diverted_minutes,
            total_minutes: totals.total_minutes,
            productivity: totals.productivity(),
            utilization: totals.utilization(435),
        }
    }

    #[test]
    fn full_target_day_scenario() {
        let totals = daily_totals(&[task_log(200), task_log(100)], &[diverted(135)]);
        assert_eq!(totals.core_minutes, 300);
        assert_eq!(totals.diverted_minutes, 135);
        assert_eq!(totals.total_minutes, 435);
        assert_eq!(totals.productivity(), 69);
        assert_eq!(totals.utilization(435), 100);
    }

    #[test]
    fn empty_day_is_all_zero() {
        let totals = daily_totals(&[], &[]);
        assert_eq!(totals, DailyTotals::default());
        assert_eq!(productivity(0, 0), 0);
        assert_eq!(utilization(0, 435), 0);
    }

    #[test]
    fn totals_ignore_row_order() {
        let forward = daily_totals(&[task_log(5), task_log(40), task_log(7)], &[diverted(3)]);
        let backward = daily_totals(&[task_log(7), task_log(40), task_log(5)], &[diverted(3)]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn productivity_stays_within_bounds() {
        for (core, diverted) in [(0, 10), (10, 0), (1, 2), (250, 250), (1, 999)] {
            let value = productivity(core, core + diverted);
            assert!(value <= 100, "core={core} diverted={diverted}");
        }
        assert_eq!(productivity(10, 0), 0);
    }

    #[test]
    fn utilization_is_linear_and_unclamped() {
        assert_eq!(utilization(435, 435), 100);
        assert_eq!(utilization(870, 435), 200);
        assert_eq!(utilization(217, 435), 50);
        assert_eq!(utilization(100, 0), 0);
    }

    #[test]
    fn status_follows_latest_entry() {
        assert_eq!(current_status(&[]), WorkStatus::Idle);
        assert_eq!(
            current_status(&[
                time_log(LogType::BreakStart, 20),
                time_log(LogType::WorkStart, 10),
            ]),
            WorkStatus::OnBreak
        );
        assert_eq!(
            current_status(&[
                time_log(LogType::WorkStart, 10),
                time_log(LogType::WorkEnd, 30),
            ]),
            WorkStatus::Idle
        );
        assert_eq!(
            current_status(&[time_log(LogType::BreakEnd, 5)]),
            WorkStatus::Idle
        );
    }

    #[test]
    fn break_time_counts_closed_and_open_breaks() {
        let logs = [
            time_log(LogType::WorkStart, 0),
            time_log(LogType::BreakStart, 600),
            time_log(LogType::BreakEnd, 1_500),
            time_log(LogType::BreakStart, 3_000),
        ];
        assert_eq!(break_minutes(&logs, 3_600), 25);
        assert_eq!(break_minutes(&[], 3_600), 0);
    }

    #[test]
    fn trend_groups_by_date_newest_first() {
        let rows = [
            summary("2026-03-01", "a", 300, 135, 69, 100),
            summary("2026-03-01", "b", 100, 100, 50, 46),
            summary("2026-03-03", "a", 200, 0, 100, 46),
        ];

        let trends = team_trend(&rows);
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].date, "2026-03-03");
        assert_eq!(trends[0].active_agents, 1);

        let first = &trends[1];
        assert_eq!(first.avg_productivity, 60);
        assert_eq!(first.avg_utilization, 73);
        assert_eq!(first.total_core_minutes, 400);
        assert_eq!(first.total_diverted_minutes, 235);
        assert_eq!(first.active_agents, 2);

        assert!(trends.iter().all(|trend| trend.date != "2026-03-02"));
    }

    #[test]
    fn team_averages_only_cover_active_profiles() {
        let stats = team_snapshot(&[agent(true, 300, 135), agent(false, 0, 60), agent(true, 0, 0)]);
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.active_agents, 2);
        assert_eq!(stats.avg_productivity, 35);
        assert_eq!(stats.avg_utilization, 50);
        assert_eq!(stats.total_core_minutes, 300);
        assert_eq!(stats.total_diverted_minutes, 195);

        assert_eq!(team_snapshot(&[]).avg_productivity, 0);
    }

    #[test]
    fn oversized_entries_saturate_instead_of_overflowing() {
        let totals = daily_totals(&[task_log(i64::MAX), task_log(1)], &[diverted(i64::MAX)]);
        assert_eq!(totals.core_minutes, i64::MAX);
        assert_eq!(totals.total_minutes, i64::MAX);
        assert_eq!(totals.productivity(), 100);
    }
}
