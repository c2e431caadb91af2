use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }

    /// Unknown roles fall back to `agent` so a malformed metadata field never grants admin.
    pub fn from_db_str(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::Agent,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    WorkStart,
    WorkEnd,
    BreakStart,
    BreakEnd,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::WorkStart => "work_start",
            LogType::WorkEnd => "work_end",
            LogType::BreakStart => "break_start",
            LogType::BreakEnd => "break_end",
        }
    }

    pub fn from_db_str(raw: &str) -> Option<Self> {
        match raw {
            "work_start" => Some(LogType::WorkStart),
            "work_end" => Some(LogType::WorkEnd),
            "break_start" => Some(LogType::BreakStart),
            "break_end" => Some(LogType::BreakEnd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Idle,
    Working,
    OnBreak,
}

impl WorkStatus {
    pub fn from_log_type(log_type: Option<LogType>) -> Self {
        match log_type {
            Some(LogType::WorkStart) => WorkStatus::Working,
            Some(LogType::BreakStart) => WorkStatus::OnBreak,
            _ => WorkStatus::Idle,
        }
    }

    pub fn allowed_actions(&self) -> &'static [LogType] {
        match self {
            WorkStatus::Idle => &[LogType::WorkStart],
            WorkStatus::Working => &[LogType::WorkEnd, LogType::BreakStart],
            WorkStatus::OnBreak => &[LogType::BreakEnd],
        }
    }

    pub fn accepts(&self, action: LogType) -> bool {
        self.allowed_actions().contains(&action)
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkStatus::Idle => "Idle",
            WorkStatus::Working => "Working",
            WorkStatus::OnBreak => "On Break",
        }
    }
}
