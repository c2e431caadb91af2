use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

const RESCHEDULE_POLL_SECONDS: u64 = 30;

/// `schedule_provider` is re-read every poll. Each run hands `task` the previous
/// day and then the planned day.
pub async fn run_daily_scheduler<S, F, Fut>(mut schedule_provider: S, mut task: F) -> Result<()>
where
    S: FnMut() -> Result<NaiveTime>,
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_logged: Option<DateTime<Local>> = None;

    loop {
        let run_time = match schedule_provider() {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, "failed to load rollup schedule");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        let now = Local::now();
        let next_run = match next_run_after(now, run_time) {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, time = %run_time, "could not place next rollup");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        if last_logged != Some(next_run) {
            info!(next_run = %next_run.format("%Y-%m-%d %H:%M"), "next rollup scheduled");
            last_logged = Some(next_run);
        }

        let delay = (next_run - now).to_std().unwrap_or_default();
        if delay > Duration::from_secs(RESCHEDULE_POLL_SECONDS) {
            sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
            continue;
        }

        sleep(delay).await;

        for date in rollup_dates(next_run.date_naive()) {
            if let Err(error) = task(date).await {
                error!(error = %error, date = %date, "scheduled rollup failed");
            }
        }

        sleep(Duration::from_secs(1)).await;
    }
}

pub fn rollup_dates(planned: NaiveDate) -> Vec<NaiveDate> {
    planned
        .pred_opt()
        .into_iter()
        .chain(std::iter::once(planned))
        .collect()
}

/// Days where `run_time` falls in a DST gap are skipped.
pub fn next_run_after(now: DateTime<Local>, run_time: NaiveTime) -> Result<DateTime<Local>> {
    let today = now.date_naive();

    (0..=2)
        .filter_map(|offset| {
            let day = today + ChronoDuration::days(offset);
            match Local.from_local_datetime(&day.and_time(run_time)) {
                LocalResult::Single(datetime) => Some(datetime),
                LocalResult::Ambiguous(earliest, _) => Some(earliest),
                LocalResult::None => None,
            }
        })
        .find(|candidate| *candidate > now)
        .with_context(|| format!("Failed to find the next run for {run_time}"))
}

#[cfg(test)]
mod tests {
    use super::{next_run_after, rollup_dates};
    use chrono::{Local, NaiveDate, NaiveTime, TimeZone};

    #[test]
    fn each_run_covers_previous_and_planned_day() {
        let planned = NaiveDate::from_ymd_opt(2026, 3, 1).expect("date");
        assert_eq!(
            rollup_dates(planned),
            vec![
                NaiveDate::from_ymd_opt(2026, 2, 28).expect("date"),
                planned
            ]
        );
        assert_eq!(rollup_dates(NaiveDate::MIN), vec![NaiveDate::MIN]);
    }

    #[test]
    fn later_today_when_time_not_reached() {
        let now = Local
            .with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
            .single()
            .expect("local time");
        let at = NaiveTime::from_hms_opt(23, 55, 0).expect("time");

        let next = next_run_after(now, at).expect("next run");
        assert_eq!(next.date_naive(), now.date_naive());
        assert_eq!(next.time(), at);
    }

    #[test]
    fn tomorrow_once_time_has_passed() {
        let now = Local
            .with_ymd_and_hms(2026, 3, 10, 23, 56, 0)
            .single()
            .expect("local time");
        let at = NaiveTime::from_hms_opt(23, 55, 0).expect("time");

        let next = next_run_after(now, at).expect("next run");
        assert_eq!(
            next.date_naive(),
            now.date_naive().succ_opt().expect("tomorrow")
        );
    }

    #[test]
    fn exact_match_moves_to_next_day() {
        let now = Local
            .with_ymd_and_hms(2026, 3, 10, 23, 55, 0)
            .single()
            .expect("local time");
        let at = NaiveTime::from_hms_opt(23, 55, 0).expect("time");

        assert!(next_run_after(now, at).expect("next run") > now);
    }
}
