//! Runtime settings (environment) and booking rules (JSON file).

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::calendar::WeeklyCalendar;
use crate::policy::Policy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid calendar: {0}")]
    InvalidCalendar(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(&'static str),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid value for {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("cannot read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rules: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Calendar plus policy, validated together. This is the value every engine
/// call takes instead of looking configuration up on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default)]
    pub calendar: WeeklyCalendar,
    #[serde(default)]
    pub policy: Policy,
}

impl Rules {
    pub fn new(calendar: WeeklyCalendar, policy: Policy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self { calendar, policy })
    }
}

/// Rules document as written, before defaults are filled in.
#[derive(Deserialize)]
struct RawRules {
    calendar: Option<WeeklyCalendar>,
    policy: Option<serde_json::Value>,
}

/// Parse and validate a rules document:
/// `{ "calendar": [CalendarEntry, ...], "policy": { ... } }`.
/// Omitted sections and policy fields take their defaults, with a warning.
pub fn parse_rules(json: &str) -> Result<Rules, ConfigError> {
    let raw: RawRules = serde_json::from_str(json)?;
    let calendar = raw.calendar.unwrap_or_else(|| {
        warn!("rules document has no calendar, using the default week");
        WeeklyCalendar::default()
    });
    let policy = match raw.policy {
        None => {
            warn!("rules document has no policy, using default policy");
            Policy::default()
        }
        Some(value) => {
            let missing = defaulted_policy_fields(&value);
            if !missing.is_empty() {
                warn!("policy fields not set, using defaults: {}", missing.join(", "));
            }
            serde_json::from_value(value)?
        }
    };
    Rules::new(calendar, policy)
}

/// Policy keys (nested ones as `parent.child`) that `value` leaves out.
fn defaulted_policy_fields(value: &serde_json::Value) -> Vec<String> {
    let Ok(serde_json::Value::Object(defaults)) = serde_json::to_value(Policy::default()) else {
        return Vec::new();
    };
    let given = value.as_object();
    let mut missing = Vec::new();
    for (key, default) in &defaults {
        match given.and_then(|g| g.get(key)) {
            None => missing.push(key.clone()),
            Some(set) => {
                if let (Some(inner_defaults), Some(inner)) = (default.as_object(), set.as_object()) {
                    missing.extend(
                        inner_defaults
                            .keys()
                            .filter(|k| !inner.contains_key(*k))
                            .map(|k| format!("{key}.{k}")),
                    );
                }
            }
        }
    }
    missing
}

/// Load rules from `path`. A missing file falls back to `Rules::default()`
/// with a warning; an unreadable or invalid file is an error.
pub fn load_rules(path: &Path) -> Result<Rules, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(json) => parse_rules(&json),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "rules file {} not found, using default calendar and policy",
                path.display()
            );
            Ok(Rules::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub timezone: Tz,
    pub rules_path: PathBuf,
    pub metrics_port: Option<u16>,
    pub refresh_secs: u64,
    pub compact_threshold: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup, so callers other than the process
    /// environment (tests, wrappers) can supply values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(lookup("SLOTKEEPER_DATA_DIR").unwrap_or_else(|| "./data".into()));

        let tz_name = lookup("SLOTKEEPER_TZ").unwrap_or_else(|| "UTC".into());
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(tz_name.clone()))?;

        let rules_path = lookup("SLOTKEEPER_RULES")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("rules.json"));

        let metrics_port = parse_opt(&lookup, "SLOTKEEPER_METRICS_PORT")?;
        let refresh_secs = parse_opt(&lookup, "SLOTKEEPER_REFRESH_SECS")?.unwrap_or(900);
        let compact_threshold = parse_opt(&lookup, "SLOTKEEPER_COMPACT_THRESHOLD")?.unwrap_or(1000);

        Ok(Self {
            data_dir,
            timezone,
            rules_path,
            metrics_port,
            refresh_secs,
            compact_threshold,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotkeeper.wal")
    }
}

fn parse_opt<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting { key, value }),
    }
}
