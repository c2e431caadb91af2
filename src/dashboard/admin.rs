use crate::config::Config;
use crate::dashboard::{DashboardQuery, totals_for_day};
use crate::db::{Database, NamedSummaryRow, ProfileRow};
use crate::metrics::{AgentDayStats, TeamStats, TeamTrend, team_snapshot, team_trend};
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub profile: ProfileRow,
    pub agents: Vec<AgentDayStats>,
    pub team: TeamStats,
    pub history_days: u32,
    pub agent_filter: Option<String>,
    pub history: Vec<NamedSummaryRow>,
    pub trends: Vec<TeamTrend>,
}

pub fn load(
    database: &Database,
    config: &Config,
    profile: &ProfileRow,
    query: &DashboardQuery,
    now: DateTime<Local>,
) -> Result<AdminDashboard> {
    let today = now.date_naive();

    let agents = database
        .list_profiles()?
        .iter()
        .map(|member| {
            totals_for_day(database, &member.id, today)
                .map(|totals| AgentDayStats::from_totals(member, totals, config.target_minutes))
        })
        .collect::<Result<Vec<_>>>()?;
    let team = team_snapshot(&agents);

    let (from, to) = query.window.date_range(today);
    let agent_filter = query
        .agent_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty() && *id != "all")
        .map(ToOwned::to_owned);

    let history = database.daily_summaries_with_names(agent_filter.as_deref(), from, to)?;
    // Trends always cover the whole team, whatever the table filter.
    let trends = team_trend(&database.daily_summaries(None, from, to)?);

    Ok(AdminDashboard {
        profile: profile.clone(),
        agents,
        team,
        history_days: query.window.days,
        agent_filter,
        history,
        trends,
    })
}
