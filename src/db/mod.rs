pub mod credentials;
pub mod queries;

use crate::model::{LogType, Role};
use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoreTaskRow {
    pub id: i64,
    pub name: String,
    pub allocated_time: i64,
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoreTaskInput {
    pub name: String,
    pub allocated_time: i64,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskLogRow {
    pub id: i64,
    pub user_id: String,
    pub core_task_id: i64,
    pub time_spent: i64,
    pub notes: Option<String>,
    pub completed_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskLogDetailRow {
    pub id: i64,
    pub completed_at: i64,
    pub time_spent: i64,
    pub notes: Option<String>,
    pub core_task_name: String,
    pub core_task_category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DivertedTaskRow {
    pub id: i64,
    pub user_id: String,
    pub task_type: String,
    pub time_spent: i64,
    pub description: Option<String>,
    pub completed_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeLogRow {
    pub id: i64,
    pub user_id: String,
    pub log_type: LogType,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummaryRow {
    pub date: String,
    pub user_id: String,
    pub core_minutes: i64,
    pub diverted_minutes: i64,
    pub total_minutes: i64,
    pub productivity_percentage: u32,
    pub utilization_percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedSummaryRow {
    #[serde(flatten)]
    pub summary: DailySummaryRow,
    pub full_name: String,
}

#[derive(Debug, Clone)]
pub struct NewTaskLog {
    pub user_id: String,
    pub core_task_id: i64,
    pub time_spent: i64,
    pub notes: Option<String>,
    pub completed_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewDivertedTask {
    pub user_id: String,
    pub task_type: String,
    pub time_spent: i64,
    pub description: Option<String>,
    pub completed_at: i64,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    /// Returns the stored row when `profile.id` exists. A row carrying the same
    /// email under an older id is re-keyed to the new id along with its history.
    pub fn ensure_profile(&self, profile: &ProfileRow) -> Result<ProfileRow> {
        if let Some(existing) = self.profile(&profile.id)? {
            return Ok(existing);
        }

        match self.profile_id_by_email(&profile.email)? {
            Some(previous_id) => self.rekey_profile(&previous_id, &profile.id)?,
            None => {
                self.conn
                    .execute(
                        "INSERT INTO profiles (id, email, full_name, role, is_active, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(id) DO NOTHING",
                        params![
                            profile.id,
                            profile.email,
                            profile.full_name,
                            profile.role.as_str(),
                            profile.is_active,
                            Utc::now().timestamp()
                        ],
                    )
                    .context("Failed to insert profile")?;
            }
        }

        self.profile(&profile.id)?
            .with_context(|| format!("Profile missing after insert: {}", profile.id))
    }

    fn profile_id_by_email(&self, email: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT id FROM profiles WHERE lower(email) = lower(?1)",
                params![email.trim()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query profile by email")
    }

    fn rekey_profile(&self, previous_id: &str, new_id: &str) -> Result<()> {
        let transaction = self
            .conn
            .unchecked_transaction()
            .context("Failed to start transaction")?;

        for statement in [
            "UPDATE profiles SET id = ?2 WHERE id = ?1",
            "UPDATE task_logs SET user_id = ?2 WHERE user_id = ?1",
            "UPDATE diverted_tasks SET user_id = ?2 WHERE user_id = ?1",
            "UPDATE time_logs SET user_id = ?2 WHERE user_id = ?1",
            "UPDATE daily_summaries SET user_id = ?2 WHERE user_id = ?1",
        ] {
            transaction
                .execute(statement, params![previous_id, new_id])
                .with_context(|| format!("Failed to re-key profile {previous_id}"))?;
        }

        transaction
            .commit()
            .context("Failed to commit profile re-key")?;
        info!(previous_id, new_id, "profile re-keyed to new identity");
        Ok(())
    }

    pub fn profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.conn
            .query_row(
                "SELECT id, email, full_name, role, is_active FROM profiles WHERE id = ?1",
                params![id],
                profile_from_row,
            )
            .optional()
            .context("Failed to query profile")
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, email, full_name, role, is_active
             FROM profiles
             ORDER BY full_name ASC",
        )?;

        let rows = statement
            .query_map([], profile_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list profiles")?;

        Ok(rows)
    }

    pub fn set_profile_active(&self, id: &str, is_active: bool) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE profiles SET is_active = ?1 WHERE id = ?2",
                params![is_active, id],
            )
            .context("Failed to update profile status")?;

        Ok(updated > 0)
    }

    pub fn sync_core_tasks(&mut self, tasks: &[CoreTaskInput]) -> Result<usize> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        tasks.iter().try_for_each(|task| {
            transaction
                .execute(
                    "INSERT INTO core_tasks (name, allocated_time, category) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name)
                     DO UPDATE SET allocated_time=excluded.allocated_time, category=excluded.category",
                    params![task.name.trim(), task.allocated_time, task.category.trim()],
                )
                .context("Failed to upsert core task")
                .map(|_| ())
        })?;

        transaction
            .commit()
            .context("Failed to commit core task catalog")?;
        Ok(tasks.len())
    }

    pub fn core_tasks(&self) -> Result<Vec<CoreTaskRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, name, allocated_time, category
             FROM core_tasks
             ORDER BY name ASC",
        )?;

        let rows = statement
            .query_map([], core_task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query core tasks")?;

        Ok(rows)
    }

    pub fn core_task(&self, id: i64) -> Result<Option<CoreTaskRow>> {
        self.conn
            .query_row(
                "SELECT id, name, allocated_time, category FROM core_tasks WHERE id = ?1",
                params![id],
                core_task_from_row,
            )
            .optional()
            .context("Failed to query core task")
    }

    pub fn insert_task_log(&self, log: &NewTaskLog) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO task_logs (user_id, core_task_id, time_spent, notes, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    log.user_id,
                    log.core_task_id,
                    log.time_spent,
                    log.notes,
                    log.completed_at
                ],
            )
            .context("Failed to insert task log")?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_diverted_task(&self, task: &NewDivertedTask) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO diverted_tasks (user_id, task_type, time_spent, description, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    task.user_id,
                    task.task_type,
                    task.time_spent,
                    task.description,
                    task.completed_at
                ],
            )
            .context("Failed to insert diverted task")?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn task_logs_between(
        &self,
        user_id: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<TaskLogRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, user_id, core_task_id, time_spent, notes, completed_at
             FROM task_logs
             WHERE user_id = ?1 AND completed_at >= ?2 AND completed_at <= ?3
             ORDER BY completed_at ASC",
        )?;

        let rows = statement
            .query_map(params![user_id, from_ts, to_ts], |row| {
                Ok(TaskLogRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    core_task_id: row.get(2)?,
                    time_spent: row.get(3)?,
                    notes: row.get(4)?,
                    completed_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query task logs")?;

        Ok(rows)
    }

    pub fn diverted_tasks_between(
        &self,
        user_id: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<DivertedTaskRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, user_id, task_type, time_spent, description, completed_at
             FROM diverted_tasks
             WHERE user_id = ?1 AND completed_at >= ?2 AND completed_at <= ?3
             ORDER BY completed_at ASC",
        )?;

        let rows = statement
            .query_map(params![user_id, from_ts, to_ts], diverted_task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query diverted tasks")?;

        Ok(rows)
    }

    pub fn recent_task_logs(
        &self,
        user_id: &str,
        since_ts: i64,
        limit: usize,
    ) -> Result<Vec<TaskLogDetailRow>> {
        let mut statement = self.conn.prepare(
            "SELECT t.id, t.completed_at, t.time_spent, t.notes, c.name, c.category
             FROM task_logs t
             JOIN core_tasks c ON c.id = t.core_task_id
             WHERE t.user_id = ?1 AND t.completed_at >= ?2
             ORDER BY t.completed_at DESC, t.id DESC
             LIMIT ?3",
        )?;

        let rows = statement
            .query_map(params![user_id, since_ts, limit as i64], |row| {
                Ok(TaskLogDetailRow {
                    id: row.get(0)?,
                    completed_at: row.get(1)?,
                    time_spent: row.get(2)?,
                    notes: row.get(3)?,
                    core_task_name: row.get(4)?,
                    core_task_category: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query recent task logs")?;

        Ok(rows)
    }

    pub fn recent_diverted_tasks(
        &self,
        user_id: &str,
        since_ts: i64,
        limit: usize,
    ) -> Result<Vec<DivertedTaskRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, user_id, task_type, time_spent, description, completed_at
             FROM diverted_tasks
             WHERE user_id = ?1 AND completed_at >= ?2
             ORDER BY completed_at DESC, id DESC
             LIMIT ?3",
        )?;

        let rows = statement
            .query_map(
                params![user_id, since_ts, limit as i64],
                diverted_task_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query recent diverted tasks")?;

        Ok(rows)
    }

    pub fn insert_time_log(&self, user_id: &str, log_type: LogType, timestamp: i64) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO time_logs (user_id, log_type, timestamp) VALUES (?1, ?2, ?3)",
                params![user_id, log_type.as_str(), timestamp],
            )
            .context("Failed to insert time log")?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn latest_time_log(&self, user_id: &str) -> Result<Option<TimeLogRow>> {
        self.conn
            .query_row(
                "SELECT id, user_id, log_type, timestamp
                 FROM time_logs
                 WHERE user_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                params![user_id],
                time_log_from_row,
            )
            .optional()
            .context("Failed to query latest time log")
    }

    pub fn time_logs_between(
        &self,
        user_id: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<TimeLogRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, user_id, log_type, timestamp
             FROM time_logs
             WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = statement
            .query_map(params![user_id, from_ts, to_ts], time_log_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query time logs")?;

        Ok(rows)
    }

    pub fn upsert_daily_summary(&self, summary: &DailySummaryRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO daily_summaries
                   (date, user_id, core_minutes, diverted_minutes, total_minutes, productivity_percentage, utilization_percentage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(date, user_id)
                 DO UPDATE SET core_minutes=excluded.core_minutes,
                               diverted_minutes=excluded.diverted_minutes,
                               total_minutes=excluded.total_minutes,
                               productivity_percentage=excluded.productivity_percentage,
                               utilization_percentage=excluded.utilization_percentage",
                params![
                    summary.date,
                    summary.user_id,
                    summary.core_minutes,
                    summary.diverted_minutes,
                    summary.total_minutes,
                    summary.productivity_percentage,
                    summary.utilization_percentage
                ],
            )
            .context("Failed to upsert daily summary")?;

        Ok(())
    }

    pub fn delete_daily_summary(&self, date: NaiveDate, user_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM daily_summaries WHERE date = ?1 AND user_id = ?2",
                params![date.format("%Y-%m-%d").to_string(), user_id],
            )
            .context("Failed to delete daily summary")?;

        Ok(())
    }

    pub fn daily_summaries(
        &self,
        user_id: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySummaryRow>> {
        let mut statement = self.conn.prepare(
            "SELECT date, user_id, core_minutes, diverted_minutes, total_minutes,
                    productivity_percentage, utilization_percentage
             FROM daily_summaries
             WHERE date >= ?1 AND date <= ?2 AND (?3 IS NULL OR user_id = ?3)
             ORDER BY date DESC, user_id ASC",
        )?;

        let rows = statement
            .query_map(
                params![
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string(),
                    user_id
                ],
                summary_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query daily summaries")?;

        Ok(rows)
    }

    pub fn daily_summaries_with_names(
        &self,
        user_id: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NamedSummaryRow>> {
        let mut statement = self.conn.prepare(
            "SELECT s.date, s.user_id, s.core_minutes, s.diverted_minutes, s.total_minutes,
                    s.productivity_percentage, s.utilization_percentage, p.full_name
             FROM daily_summaries s
             JOIN profiles p ON p.id = s.user_id
             WHERE s.date >= ?1 AND s.date <= ?2 AND (?3 IS NULL OR s.user_id = ?3)
             ORDER BY s.date DESC, p.full_name ASC",
        )?;

        let rows = statement
            .query_map(
                params![
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string(),
                    user_id
                ],
                |row| {
                    Ok(NamedSummaryRow {
                        summary: summary_from_row(row)?,
                        full_name: row.get(7)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query daily summaries with names")?;

        Ok(rows)
    }

    pub fn latest_summary_date(&self) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT date FROM daily_summaries ORDER BY date DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query latest summary date")
    }
}

/// Unix-second bounds of a local calendar day, both ends inclusive.
pub fn day_bounds(date: NaiveDate) -> Result<(i64, i64)> {
    let from = date
        .and_hms_opt(0, 0, 0)
        .context("Failed to build from timestamp")?;
    let to = (date + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .context("Failed to build to timestamp")?;

    let from_ts = Local
        .from_local_datetime(&from)
        .earliest()
        .context("Failed to convert from timestamp to local time")?
        .timestamp();
    let to_ts = Local
        .from_local_datetime(&to)
        .earliest()
        .context("Failed to convert to timestamp to local time")?
        .timestamp()
        - 1;

    Ok((from_ts, to_ts))
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    let role: String = row.get(3)?;

    Ok(ProfileRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        role: Role::from_db_str(&role),
        is_active: row.get(4)?,
    })
}

fn core_task_from_row(row: &Row<'_>) -> rusqlite::Result<CoreTaskRow> {
    Ok(CoreTaskRow {
        id: row.get(0)?,
        name: row.get(1)?,
        allocated_time: row.get(2)?,
        category: row.get(3)?,
    })
}

fn diverted_task_from_row(row: &Row<'_>) -> rusqlite::Result<DivertedTaskRow> {
    Ok(DivertedTaskRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_type: row.get(2)?,
        time_spent: row.get(3)?,
        description: row.get(4)?,
        completed_at: row.get(5)?,
    })
}

fn time_log_from_row(row: &Row<'_>) -> rusqlite::Result<TimeLogRow> {
    let raw: String = row.get(2)?;
    let log_type = LogType::from_db_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown log_type: {raw}").into(),
        )
    })?;

    Ok(TimeLogRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        log_type,
        timestamp: row.get(3)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<DailySummaryRow> {
    Ok(DailySummaryRow {
        date: row.get(0)?,
        user_id: row.get(1)?,
        core_minutes: row.get(2)?,
        diverted_minutes: row.get(3)?,
        total_minutes: row.get(4)?,
        productivity_percentage: row.get(5)?,
        utilization_percentage: row.get(6)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        CoreTaskInput, DailySummaryRow, Database, NewDivertedTask, NewTaskLog, ProfileRow,
        day_bounds,
    };
    use crate::model::{LogType, Role};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    pub(crate) fn temp_database() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("temp dir");
        let database = Database::open(&dir.path().join("test.db")).expect("database opens");
        (dir, database)
    }

    pub(crate) fn profile(id: &str, name: &str, role: Role) -> ProfileRow {
        ProfileRow {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            full_name: name.to_string(),
            role,
            is_active: true,
        }
    }

    #[test]
    fn ensure_profile_keeps_existing_row() {
        let (_dir, database) = temp_database();
        database
            .ensure_profile(&profile("u1", "Ada", Role::Admin))
            .expect("first insert");

        let stored = database
            .ensure_profile(&profile("u1", "Someone Else", Role::Agent))
            .expect("second insert");

        assert_eq!(stored.full_name, "Ada");
        assert_eq!(stored.role, Role::Admin);
    }

    #[test]
    fn recreated_identity_takes_over_profile_with_same_email() {
        let (_dir, database) = temp_database();
        let original = ProfileRow {
            email: "ada@example.com".to_string(),
            ..profile("old-id", "Ada", Role::Admin)
        };
        database.ensure_profile(&original).expect("first insert");
        assert!(database.set_profile_active("old-id", false).expect("update"));
        database
            .insert_time_log("old-id", LogType::WorkStart, 1_000)
            .expect("time log");

        let recreated = ProfileRow {
            id: "new-id".to_string(),
            email: "Ada@Example.com".to_string(),
            ..profile("new-id", "Ada Again", Role::Agent)
        };
        let stored = database.ensure_profile(&recreated).expect("re-keyed");

        assert_eq!(stored.id, "new-id");
        assert_eq!(stored.full_name, "Ada");
        assert_eq!(stored.role, Role::Admin);
        assert!(!stored.is_active);
        assert!(database.profile("old-id").expect("query").is_none());
        assert_eq!(database.list_profiles().expect("list").len(), 1);
        assert!(
            database
                .latest_time_log("new-id")
                .expect("query")
                .is_some()
        );
        assert!(database.latest_time_log("old-id").expect("query").is_none());
    }

    #[test]
    fn profiles_are_listed_by_full_name() {
        let (_dir, database) = temp_database();
        database
            .ensure_profile(&profile("u1", "Zed", Role::Agent))
            .expect("insert");
        database
            .ensure_profile(&profile("u2", "Amy", Role::Agent))
            .expect("insert");

        let names = database
            .list_profiles()
            .expect("list")
            .into_iter()
            .map(|row| row.full_name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Amy", "Zed"]);

        assert!(database.set_profile_active("u1", false).expect("update"));
        assert!(!database.set_profile_active("missing", false).expect("update"));
        assert!(!database.profile("u1").expect("query").expect("exists").is_active);
    }

    #[test]
    fn catalog_sync_upserts_by_name() {
        let (_dir, mut database) = temp_database();
        let first = vec![CoreTaskInput {
            name: "Case Review".to_string(),
            allocated_time: 15,
            category: "Processing".to_string(),
        }];
        database.sync_core_tasks(&first).expect("sync");

        let second = vec![CoreTaskInput {
            name: "Case Review".to_string(),
            allocated_time: 20,
            category: "Processing".to_string(),
        }];
        database.sync_core_tasks(&second).expect("resync");

        let tasks = database.core_tasks().expect("catalog");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].allocated_time, 20);
    }

    #[test]
    fn logs_are_filtered_by_user_and_window() {
        let (_dir, mut database) = temp_database();
        database
            .sync_core_tasks(&[CoreTaskInput {
                name: "Quality Check".to_string(),
                allocated_time: 12,
                category: "Quality".to_string(),
            }])
            .expect("sync");
        let task_id = database.core_tasks().expect("catalog")[0].id;

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        let (from, to) = day_bounds(date).expect("bounds");

        for (user, at) in [("u1", from + 60), ("u1", to + 10), ("u2", from + 60)] {
            database
                .insert_task_log(&NewTaskLog {
                    user_id: user.to_string(),
                    core_task_id: task_id,
                    time_spent: 15,
                    notes: None,
                    completed_at: at,
                })
                .expect("insert");
        }
        database
            .insert_diverted_task(&NewDivertedTask {
                user_id: "u1".to_string(),
                task_type: "Meeting".to_string(),
                time_spent: 30,
                description: Some("standup".to_string()),
                completed_at: to,
            })
            .expect("insert diverted");

        assert_eq!(
            database
                .task_logs_between("u1", from, to)
                .expect("query")
                .len(),
            1
        );
        assert_eq!(
            database
                .diverted_tasks_between("u1", from, to)
                .expect("query")
                .len(),
            1
        );

        let recent = database.recent_task_logs("u1", from, 20).expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].completed_at, to + 10);
        assert_eq!(recent[0].core_task_name, "Quality Check");
    }

    #[test]
    fn latest_time_log_breaks_timestamp_ties_by_insertion() {
        let (_dir, database) = temp_database();
        database
            .insert_time_log("u1", LogType::WorkStart, 100)
            .expect("insert");
        database
            .insert_time_log("u1", LogType::BreakStart, 100)
            .expect("insert");

        let latest = database
            .latest_time_log("u1")
            .expect("query")
            .expect("row exists");
        assert_eq!(latest.log_type, LogType::BreakStart);
        assert!(database.latest_time_log("u2").expect("query").is_none());
    }

    #[test]
    fn summary_upsert_replaces_row_for_same_day() {
        let (_dir, database) = temp_database();
        database
            .ensure_profile(&profile("u1", "Ada", Role::Agent))
            .expect("profile");
        let mut summary = DailySummaryRow {
            date: "2026-03-02".to_string(),
            user_id: "u1".to_string(),
            core_minutes: 100,
            diverted_minutes: 0,
            total_minutes: 100,
            productivity_percentage: 100,
            utilization_percentage: 23,
        };
        database.upsert_daily_summary(&summary).expect("upsert");
        summary.core_minutes = 300;
        database.upsert_daily_summary(&summary).expect("upsert again");

        let from = NaiveDate::from_ymd_opt(2026, 3, 1).expect("date");
        let to = NaiveDate::from_ymd_opt(2026, 3, 3).expect("date");
        let rows = database.daily_summaries(None, from, to).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].core_minutes, 300);

        let named = database
            .daily_summaries_with_names(Some("u1"), from, to)
            .expect("named query");
        assert_eq!(named[0].full_name, "Ada");
        assert!(
            database
                .daily_summaries(Some("u2"), from, to)
                .expect("query")
                .is_empty()
        );
    }
}
