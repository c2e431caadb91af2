use crate::db::CoreTaskInput;
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveTime;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".TaskPulse";
const CONFIG_FILE: &str = "config.json";
const CORE_TASKS_FILE: &str = "core_tasks.json";
const DEFAULT_ROLLUP_TIME: &str = "23:55";
pub const DEFAULT_TARGET_MINUTES: i64 = 435;
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 100_000;
pub const AUTH_API_KEY_ENV: &str = "TASKPULSE_AUTH_API_KEY";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityBackendKind {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailurePolicy {
    #[default]
    Deny,
    Allow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoreTaskCatalog {
    pub tasks: Vec<CoreTaskInput>,
}

impl CoreTaskCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read core task catalog: {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse core task catalog: {}", path.display()))?;

        parsed.validated()
    }

    fn validated(self) -> Result<Self> {
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                bail!("Core task names must not be empty");
            }
            if task.allocated_time <= 0 {
                bail!(
                    "Core task {} needs a positive allocated_time, got {}",
                    task.name,
                    task.allocated_time
                );
            }
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub core_tasks_path: PathBuf,
    pub api_port: u16,
    pub rollup_time: String,
    pub target_minutes: i64,
    pub diverted_task_types: Vec<String>,
    pub identity_provider: IdentityBackendKind,
    pub auth_base_url: String,
    pub auth_api_key: Option<String>,
    pub auth_timeout_seconds: u64,
    pub auth_failure_policy: AuthFailurePolicy,
    pub require_email_confirmation: bool,
    pub session_ttl_hours: u32,
    pub password_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: root.join("db").join("taskpulse.db"),
            core_tasks_path: root.join(CORE_TASKS_FILE),
            api_port: 7435,
            rollup_time: DEFAULT_ROLLUP_TIME.to_string(),
            target_minutes: DEFAULT_TARGET_MINUTES,
            diverted_task_types: default_diverted_task_types(),
            identity_provider: IdentityBackendKind::Local,
            auth_base_url: "http://127.0.0.1:54321".to_string(),
            auth_api_key: None,
            auth_timeout_seconds: 10,
            auth_failure_policy: AuthFailurePolicy::Deny,
            require_email_confirmation: false,
            session_ttl_hours: 12,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(&config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        if !self.core_tasks_path.exists() {
            fs::write(
                &self.core_tasks_path,
                include_str!("../assets/core_tasks.json"),
            )
            .with_context(|| {
                format!(
                    "Failed to create default core task catalog: {}",
                    self.core_tasks_path.display()
                )
            })?;
            set_mode_600(&self.core_tasks_path)?;
        }

        Ok(())
    }

    pub fn load_core_tasks(&self) -> Result<CoreTaskCatalog> {
        CoreTaskCatalog::load(&self.core_tasks_path)
    }

    pub fn parse_rollup_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.rollup_time)
    }

    pub fn resolved_auth_api_key(&self) -> Option<String> {
        std::env::var(AUTH_API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                self.auth_api_key
                    .clone()
                    .filter(|value| !value.trim().is_empty())
            })
    }

    pub fn diverted_task_type(&self, task_type: &str) -> Option<&str> {
        self.diverted_task_types
            .iter()
            .find(|known| known.eq_ignore_ascii_case(task_type.trim()))
            .map(String::as_str)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "core_tasks_path" => {
                self.core_tasks_path = expand_home(value);
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "rollup_time" => {
                parse_hhmm(value)?;
                self.rollup_time = value.to_string();
            }
            "target_minutes" => {
                let parsed = value
                    .parse::<i64>()
                    .map_err(|_| anyhow!("target_minutes must be a number"))?;
                if parsed <= 0 {
                    bail!("target_minutes must be greater than zero");
                }
                self.target_minutes = parsed;
            }
            "diverted_task_types" => {
                let types = value
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>();

                if types.is_empty() {
                    bail!("diverted_task_types requires at least one type");
                }
                self.diverted_task_types = types;
            }
            "identity_provider" => {
                self.identity_provider = match value.trim() {
                    "local" => IdentityBackendKind::Local,
                    "remote" => IdentityBackendKind::Remote,
                    _ => bail!("identity_provider must be local/remote"),
                };
            }
            "auth_base_url" => {
                let trimmed = value.trim().trim_end_matches('/');
                url::Url::parse(trimmed)
                    .with_context(|| format!("auth_base_url is not a valid URL: {trimmed}"))?;
                self.auth_base_url = trimmed.to_string();
            }
            "auth_api_key" => {
                self.auth_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "auth_timeout_seconds" => {
                self.auth_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("auth_timeout_seconds must be a number"))?
                    .max(2);
            }
            "auth_failure_policy" => {
                self.auth_failure_policy = match value.trim() {
                    "deny" => AuthFailurePolicy::Deny,
                    "allow" => AuthFailurePolicy::Allow,
                    _ => bail!("auth_failure_policy must be deny/allow"),
                };
            }
            "require_email_confirmation" => {
                self.require_email_confirmation = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("require_email_confirmation must be true/false"))?;
            }
            "session_ttl_hours" => {
                self.session_ttl_hours = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("session_ttl_hours must be a number"))?
                    .max(1);
            }
            "password_iterations" => {
                let parsed = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("password_iterations must be a number"))?;
                if parsed < 1_000 {
                    bail!("password_iterations must be at least 1000");
                }
                self.password_iterations = parsed;
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, core_tasks_path|tasks.catalog, api_port|api.port, rollup_time|rollup.time, target_minutes|metrics.target_minutes, diverted_task_types|tasks.diverted_types, identity_provider|auth.provider, auth_base_url|auth.base_url, auth_api_key|auth.api_key, auth_timeout_seconds|auth.timeout_seconds, auth_failure_policy|auth.failure_policy, require_email_confirmation|auth.require_confirmation, session_ttl_hours|auth.session_ttl_hours, password_iterations|auth.password_iterations"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "core_tasks_path" => Some(self.core_tasks_path.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "rollup_time" => Some(self.rollup_time.clone()),
            "target_minutes" => Some(self.target_minutes.to_string()),
            "diverted_task_types" => Some(self.diverted_task_types.join(",")),
            "identity_provider" => Some(
                match self.identity_provider {
                    IdentityBackendKind::Local => "local",
                    IdentityBackendKind::Remote => "remote",
                }
                .to_string(),
            ),
            "auth_base_url" => Some(self.auth_base_url.clone()),
            "auth_api_key" => Some(
                self.auth_api_key
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "auth_timeout_seconds" => Some(self.auth_timeout_seconds.to_string()),
            "auth_failure_policy" => Some(
                match self.auth_failure_policy {
                    AuthFailurePolicy::Deny => "deny",
                    AuthFailurePolicy::Allow => "allow",
                }
                .to_string(),
            ),
            "require_email_confirmation" => Some(self.require_email_confirmation.to_string()),
            "session_ttl_hours" => Some(self.session_ttl_hours.to_string()),
            "password_iterations" => Some(self.password_iterations.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "core_tasks_path" | "tasks.catalog" => "core_tasks_path",
        "api_port" | "api.port" => "api_port",
        "rollup_time" | "rollup.time" => "rollup_time",
        "target_minutes" | "metrics.target_minutes" => "target_minutes",
        "diverted_task_types" | "tasks.diverted_types" => "diverted_task_types",
        "identity_provider" | "auth.provider" => "identity_provider",
        "auth_base_url" | "auth.base_url" => "auth_base_url",
        "auth_api_key" | "auth.api_key" => "auth_api_key",
        "auth_timeout_seconds" | "auth.timeout_seconds" => "auth_timeout_seconds",
        "auth_failure_policy" | "auth.failure_policy" => "auth_failure_policy",
        "require_email_confirmation" | "auth.require_confirmation" => {
            "require_email_confirmation"
        }
        "session_ttl_hours" | "auth.session_ttl_hours" => "session_ttl_hours",
        "password_iterations" | "auth.password_iterations" => "password_iterations",
        _ => key,
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Invalid time format: {value}. Example: 23:55 (24-hour format)",))
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_diverted_task_types() -> Vec<String> {
    ["Meeting", "Coaching", "Training", "Compliance Training"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AuthFailurePolicy, Config, CoreTaskCatalog, IdentityBackendKind};

    #[test]
    fn defaults_fail_closed_with_local_identity() {
        let config = Config::default();
        assert_eq!(config.auth_failure_policy, AuthFailurePolicy::Deny);
        assert_eq!(config.identity_provider, IdentityBackendKind::Local);
        assert_eq!(config.target_minutes, 435);
    }

    #[test]
    fn dotted_keys_are_aliases() {
        let mut config = Config::default();
        config
            .set_value("auth.failure_policy", "allow")
            .expect("policy set");
        assert_eq!(
            config.get_value("auth_failure_policy").as_deref(),
            Some("allow")
        );

        config.set_value("rollup.time", "22:10").expect("time set");
        assert_eq!(config.rollup_time, "22:10");
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set_value("rollup_time", "25:99").is_err());
        assert!(config.set_value("target_minutes", "0").is_err());
        assert!(config.set_value("auth.provider", "ldap").is_err());
        assert!(config.set_value("unknown.key", "1").is_err());
    }

    #[test]
    fn diverted_types_match_case_insensitively() {
        let config = Config::default();
        assert_eq!(
            config.diverted_task_type(" compliance training"),
            Some("Compliance Training")
        );
        assert!(config.diverted_task_type("Lunch").is_none());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_port": 9000}"#).expect("partial config parses");
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.rollup_time, "23:55");
    }

    #[test]
    fn bundled_catalog_parses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("core_tasks.json");
        std::fs::write(&path, include_str!("../assets/core_tasks.json")).expect("write");

        let catalog = CoreTaskCatalog::load(&path).expect("catalog");
        assert_eq!(catalog.tasks.len(), 6);
        assert!(catalog.tasks.iter().all(|task| task.allocated_time > 0));
    }

    #[test]
    fn catalog_rejects_non_positive_allocation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("core_tasks.json");
        std::fs::write(
            &path,
            r#"{"tasks":[{"name":"Case Review","allocated_time":0,"category":"Processing"}]}"#,
        )
        .expect("write");

        assert!(CoreTaskCatalog::load(&path).is_err());

        std::fs::write(
            &path,
            r#"{"tasks":[{"name":"  ","allocated_time":10,"category":"Processing"}]}"#,
        )
        .expect("write");
        assert!(CoreTaskCatalog::load(&path).is_err());
    }
}
