//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then `tutord.toml` (explicit path,
//! `TUTORD_CONFIG`, or the workspace directory), then CLI flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::parse_time;

pub const CONFIG_FILE: &str = "tutord.toml";
pub const CONFIG_ENV: &str = "TUTORD_CONFIG";
pub const MAX_GRACE_DAYS: i64 = 3650;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Sqlite,
    Demo,
}

impl StorageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageMode::Sqlite => "sqlite",
            StorageMode::Demo => "demo",
        }
    }

    pub fn parse(raw: &str) -> Option<StorageMode> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "api" => Some(StorageMode::Sqlite),
            "demo" | "local" | "localstorage" => Some(StorageMode::Demo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
    pub cache: CacheConfig,
    pub finance: FinanceConfig,
    pub classes: ClassesConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StorageMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// First visible hour of the weekly grid, `HH:MM`.
    pub day_start: String,
    pub day_end: String,
    pub pixels_per_hour: f64,
    pub min_event_height: f64,
    pub conflict_debounce_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            day_start: "08:00".to_string(),
            day_end: "21:00".to_string(),
            pixels_per_hour: 60.0,
            min_event_height: 20.0,
            conflict_debounce_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinanceConfig {
    pub currency: String,
    pub overdue_grace_days: i64,
    /// Day of month generated obligations fall due when none is given.
    pub default_due_day: u32,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            overdue_grace_days: 0,
            default_due_day: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassesConfig {
    pub max_students: u32,
}

impl Default for ClassesConfig {
    fn default() -> Self {
        Self { max_students: 15 }
    }
}

impl Config {
    /// Loads `explicit`, else `$TUTORD_CONFIG`, else `<workspace>/tutord.toml`.
    /// A missing implicit file yields defaults; a missing explicit one is an error.
    pub fn load(explicit: Option<&Path>, workspace: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let (path, required) = match (explicit, env_path) {
            (Some(p), _) => (Some(p.to_path_buf()), true),
            (None, Some(p)) => (Some(p), true),
            (None, None) => (workspace.map(|w| w.join(CONFIG_FILE)), false),
        };
        let Some(path) = path else {
            return Ok(Config::default());
        };
        if !path.exists() && !required {
            return Ok(Config::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let start = parse_time(&self.schedule.day_start)
            .ok_or_else(|| ConfigError::Invalid("schedule.day_start must be HH:MM".into()))?;
        let end = parse_time(&self.schedule.day_end)
            .ok_or_else(|| ConfigError::Invalid("schedule.day_end must be HH:MM".into()))?;
        if end <= start {
            return Err(ConfigError::Invalid(
                "schedule.day_end must be later than schedule.day_start".into(),
            ));
        }
        let pph = self.schedule.pixels_per_hour;
        if !pph.is_finite() || pph <= 0.0 {
            return Err(ConfigError::Invalid(
                "schedule.pixels_per_hour must be greater than 0".into(),
            ));
        }
        if self.classes.max_students == 0 {
            return Err(ConfigError::Invalid(
                "classes.max_students must be at least 1".into(),
            ));
        }
        if !(1..=28).contains(&self.finance.default_due_day) {
            return Err(ConfigError::Invalid(
                "finance.default_due_day must be between 1 and 28".into(),
            ));
        }
        if !(0..=MAX_GRACE_DAYS).contains(&self.finance.overdue_grace_days) {
            return Err(ConfigError::Invalid(format!(
                "finance.overdue_grace_days must be between 0 and {}",
                MAX_GRACE_DAYS
            )));
        }
        if self.finance.currency.trim().is_empty() {
            return Err(ConfigError::Invalid("finance.currency must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            [schedule]
            pixels_per_hour = 48.0

            [storage]
            mode = "demo"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.schedule.pixels_per_hour, 48.0);
        assert_eq!(cfg.schedule.day_start, "08:00");
        assert_eq!(cfg.storage.mode, StorageMode::Demo);
        assert_eq!(cfg.classes.max_students, 15);
    }

    #[test]
    fn rejects_inverted_day_window() {
        let err = Config::from_toml(
            r#"
            [schedule]
            day_start = "18:00"
            day_end = "09:00"
            "#,
        )
        .expect_err("inverted");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_grace_days() {
        for raw in ["100000000", "-1"] {
            let err = Config::from_toml(&format!("[finance]\noverdue_grace_days = {}", raw))
                .expect_err("out of range");
            assert!(matches!(err, ConfigError::Invalid(_)));
        }
        let cfg = Config::from_toml("[finance]\noverdue_grace_days = 3650").expect("upper bound");
        assert_eq!(cfg.finance.overdue_grace_days, MAX_GRACE_DAYS);
    }

    #[test]
    fn missing_workspace_file_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        if std::env::var_os(CONFIG_ENV).is_some() {
            return;
        }
        let cfg = Config::load(None, Some(dir.path())).expect("defaults");
        assert_eq!(cfg, Config::default());
    }
}
