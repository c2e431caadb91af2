pub const CREATE_PROFILES: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
  id         TEXT PRIMARY KEY,
  email      TEXT NOT NULL UNIQUE,
  full_name  TEXT NOT NULL,
  role       TEXT NOT NULL DEFAULT 'agent',
  is_active  INTEGER NOT NULL DEFAULT 1,
  created_at INTEGER NOT NULL
);
"#;

pub const CREATE_CORE_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS core_tasks (
  id             INTEGER PRIMARY KEY AUTOINCREMENT,
  name           TEXT NOT NULL UNIQUE,
  allocated_time INTEGER NOT NULL DEFAULT 0,
  category       TEXT NOT NULL DEFAULT 'General'
);
"#;

pub const CREATE_TASK_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS task_logs (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id      TEXT NOT NULL,
  core_task_id INTEGER NOT NULL REFERENCES core_tasks(id),
  time_spent   INTEGER NOT NULL,
  notes        TEXT,
  completed_at INTEGER NOT NULL
);
"#;

pub const CREATE_DIVERTED_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS diverted_tasks (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id      TEXT NOT NULL,
  task_type    TEXT NOT NULL,
  time_spent   INTEGER NOT NULL,
  description  TEXT,
  completed_at INTEGER NOT NULL
);
"#;

pub const CREATE_TIME_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS time_logs (
  id        INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id   TEXT NOT NULL,
  log_type  TEXT NOT NULL,
  timestamp INTEGER NOT NULL
);
"#;

pub const CREATE_DAILY_SUMMARIES: &str = r#"
CREATE TABLE IF NOT EXISTS daily_summaries (
  id                       INTEGER PRIMARY KEY AUTOINCREMENT,
  date                     TEXT NOT NULL,
  user_id                  TEXT NOT NULL,
  core_minutes             INTEGER NOT NULL DEFAULT 0,
  diverted_minutes         INTEGER NOT NULL DEFAULT 0,
  total_minutes            INTEGER NOT NULL DEFAULT 0,
  productivity_percentage  INTEGER NOT NULL DEFAULT 0,
  utilization_percentage   INTEGER NOT NULL DEFAULT 0,
  UNIQUE(date, user_id)
);
"#;

pub const CREATE_LOCAL_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS local_users (
  id                 TEXT PRIMARY KEY,
  email              TEXT NOT NULL UNIQUE,
  full_name          TEXT NOT NULL,
  role               TEXT NOT NULL DEFAULT 'agent',
  password_salt      TEXT NOT NULL,
  password_hash      TEXT NOT NULL,
  confirmed_at       INTEGER,
  confirmation_token TEXT,
  created_at         INTEGER NOT NULL
);
"#;

pub const CREATE_LOCAL_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS local_sessions (
  token      TEXT PRIMARY KEY,
  user_id    TEXT NOT NULL,
  expires_at INTEGER NOT NULL
);
"#;

pub const INDEX_TASK_LOGS_USER_COMPLETED: &str =
    "CREATE INDEX IF NOT EXISTS idx_task_logs_user_completed ON task_logs(user_id, completed_at);";

pub const INDEX_DIVERTED_TASKS_USER_COMPLETED: &str = "CREATE INDEX IF NOT EXISTS idx_diverted_tasks_user_completed ON diverted_tasks(user_id, completed_at);";

pub const INDEX_TIME_LOGS_USER_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_time_logs_user_timestamp ON time_logs(user_id, timestamp);";

pub const INDEX_DAILY_SUMMARIES_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_daily_summaries_date ON daily_summaries(date);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_PROFILES,
        CREATE_CORE_TASKS,
        CREATE_TASK_LOGS,
        CREATE_DIVERTED_TASKS,
        CREATE_TIME_LOGS,
        CREATE_DAILY_SUMMARIES,
        CREATE_LOCAL_USERS,
        CREATE_LOCAL_SESSIONS,
        INDEX_TASK_LOGS_USER_COMPLETED,
        INDEX_DIVERTED_TASKS_USER_COMPLETED,
        INDEX_TIME_LOGS_USER_TIMESTAMP,
        INDEX_DAILY_SUMMARIES_DATE,
    ]
}
