//! Curator configuration
//!
//! Loaded from a JSON, YAML or TOML file (chosen by extension) and then
//! overridden from the environment. Values are kept close to what the
//! operator wrote: fractions may be `0.8`, `"0.8"` or `"80%"`, timespans may
//! be integer seconds or strings like `"1h 30m"`. They are resolved and
//! validated when the policy snapshot and runtime settings are built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::budget::RateWindowConfig;
use crate::policy::{
    AuthorRule, ConfigError, ConfigResult, CurationPolicy, DelegateRule, PriorityThresholds,
    PriorityTier, ThresholdBoundary,
};

/// Files tried, in order, when no config path is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "curator-config.json",
    "curator-config.yaml",
    "curator-config.toml",
];

const DEFAULT_MIN_POST_AGE_SECS: u64 = 60;
const DEFAULT_MAX_POST_AGE_SECS: u64 = 2 * 24 * 60 * 60;
const DEFAULT_PRIORITY_HIGH: f64 = 0.8;
const DEFAULT_PRIORITY_NORMAL: f64 = 0.9;
const DEFAULT_PRIORITY_LOW: f64 = 0.95;
const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 10;
const DEFAULT_RESOURCE_REFRESH_SECS: u64 = 20;
const DEFAULT_HISTORY_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_EXECUTOR_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_EXECUTOR_COOLDOWN_SECS: u64 = 60;

// =========================================================================
// Value parsing
// =========================================================================

/// A fraction written as a number, a percentage or a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FractionValue {
    Number(f64),
    Text(String),
}

impl FractionValue {
    pub fn resolve(&self, key: &str) -> ConfigResult<f64> {
        match self {
            FractionValue::Number(value) => Ok(*value),
            FractionValue::Text(text) => parse_fraction(text).map_err(|reason| {
                ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: text.clone(),
                    reason,
                }
            }),
        }
    }
}

/// Parse `"80%"` or `"0.8"`. Integers without a dot or percent sign are rejected.
pub fn parse_fraction(raw: &str) -> Result<f64, String> {
    let text = raw.trim();
    if let Some(percent) = text.strip_suffix('%') {
        return percent
            .trim()
            .parse::<f64>()
            .map(|value| value / 100.0)
            .map_err(|e| format!("invalid percentage: {}", e));
    }
    if text.contains('.') {
        return text
            .parse::<f64>()
            .map_err(|e| format!("invalid decimal fraction: {}", e));
    }
    Err("a percentage or decimal fraction is required".to_string())
}

/// A duration written as integer seconds or a human-readable string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimespanValue {
    Seconds(u64),
    Text(String),
}

impl TimespanValue {
    pub fn resolve(&self, key: &str) -> ConfigResult<Duration> {
        match self {
            TimespanValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            TimespanValue::Text(text) => parse_timespan(text).map_err(|reason| {
                ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: text.clone(),
                    reason,
                }
            }),
        }
    }
}

/// Parse `"90"`, `"90s"`, `"2 days"`, `"1h 30m"` and similar.
///
/// A bare integer is seconds; anything else goes through `humantime`.
pub fn parse_timespan(raw: &str) -> Result<Duration, String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err("empty timespan".to_string());
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(text).map_err(|e| e.to_string())
}

// =========================================================================
// Rule entries
// =========================================================================

/// An author given as a bare name or a full rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorEntry {
    Name(String),
    Rule(AuthorRule),
}

impl AuthorEntry {
    pub fn name(&self) -> &str {
        match self {
            AuthorEntry::Name(name) => name,
            AuthorEntry::Rule(rule) => &rule.name,
        }
    }

    pub fn into_rule(self) -> AuthorRule {
        match self {
            AuthorEntry::Name(name) => AuthorRule::new(name),
            AuthorEntry::Rule(rule) => rule,
        }
    }
}

/// A delegate given as a bare name or a full rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelegateEntry {
    Name(String),
    Rule(DelegateRule),
}

impl DelegateEntry {
    pub fn into_rule(self) -> DelegateRule {
        match self {
            DelegateEntry::Name(name) => DelegateRule::new(name),
            DelegateEntry::Rule(rule) => rule,
        }
    }
}

// =========================================================================
// Config
// =========================================================================

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Rate window section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateWindowSection {
    pub window: Option<TimespanValue>,
    pub max_entries: Option<usize>,
    pub allotment: Option<u32>,
}

/// Runtime settings resolved from [`CuratorConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub database_path: PathBuf,
    pub dispatch_interval: Duration,
    pub resource_refresh_interval: Duration,
    pub history_interval: Duration,
    pub executor_failure_threshold: u32,
    pub executor_cooldown: Duration,
    pub rate_window: RateWindowConfig,
}

/// Curator configuration as written by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub database_path: PathBuf,
    pub min_post_age: Option<TimespanValue>,
    pub max_post_age: Option<TimespanValue>,
    pub priority_high: Option<FractionValue>,
    pub priority_normal: Option<FractionValue>,
    pub priority_low: Option<FractionValue>,
    pub priority_boundary: ThresholdBoundary,
    pub blacklist_authors: Vec<String>,
    pub blacklist_categories: Vec<String>,
    pub authors: Vec<AuthorEntry>,
    pub delegates: Vec<DelegateEntry>,
    pub rate_window: RateWindowSection,
    pub dispatch_interval: Option<TimespanValue>,
    pub resource_refresh_interval: Option<TimespanValue>,
    pub history_interval: Option<TimespanValue>,
    pub executor_failure_threshold: Option<u32>,
    pub executor_cooldown: Option<TimespanValue>,

    // Legacy keys, folded into the keys above by `migrate_legacy_keys`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_delay: Option<TimespanValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_voting_power: Option<FractionValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_voting_power: Option<FractionValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backup_authors: Vec<AuthorEntry>,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database/"),
            min_post_age: None,
            max_post_age: None,
            priority_high: None,
            priority_normal: None,
            priority_low: None,
            priority_boundary: ThresholdBoundary::Inclusive,
            blacklist_authors: Vec::new(),
            blacklist_categories: vec!["spam".to_string()],
            authors: Vec::new(),
            delegates: Vec::new(),
            rate_window: RateWindowSection::default(),
            dispatch_interval: None,
            resource_refresh_interval: None,
            history_interval: None,
            executor_failure_threshold: None,
            executor_cooldown: None,
            vote_delay: None,
            min_voting_power: None,
            max_voting_power: None,
            backup_authors: Vec::new(),
        }
    }
}

impl CuratorConfig {
    /// Load a config file, choosing the parser by extension.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&contents, format).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse config text and migrate legacy keys.
    pub fn parse(contents: &str, format: ConfigFormat) -> ConfigResult<Self> {
        let parse_error = |reason: String| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason,
        };
        let mut config: CuratorConfig = match format {
            ConfigFormat::Json => {
                serde_json::from_str(contents).map_err(|e| parse_error(e.to_string()))?
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_str(contents).map_err(|e| parse_error(e.to_string()))?
            }
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| parse_error(e.to_string()))?,
        };
        config.migrate_legacy_keys();
        Ok(config)
    }

    /// Load from `CURATOR_CONFIG`, else the first default file that exists,
    /// else defaults; then apply environment overrides.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = match std::env::var("CURATOR_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => match DEFAULT_CONFIG_FILES.iter().find(|f| Path::new(f).exists()) {
                Some(path) => Self::load(path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `CURATOR_DATABASE_PATH` and `CURATOR_DISPATCH_INTERVAL_SECS`
    /// as found by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CURATOR_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("CURATOR_DISPATCH_INTERVAL_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "CURATOR_DISPATCH_INTERVAL_SECS".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            self.dispatch_interval = Some(TimespanValue::Seconds(secs));
        }
        Ok(())
    }

    /// Fold keys from older config versions into their current names.
    ///
    /// Returns the legacy keys that were migrated.
    pub fn migrate_legacy_keys(&mut self) -> Vec<&'static str> {
        let mut migrated = Vec::new();

        if let Some(delay) = self.vote_delay.take() {
            if self.min_post_age.is_none() {
                self.min_post_age = Some(delay);
                info!("Updated old value \"vote_delay\" to \"min_post_age\"");
                migrated.push("vote_delay");
            }
        }
        if let Some(power) = self.min_voting_power.take() {
            if self.priority_high.is_none() {
                self.priority_high = Some(power);
                info!("Updated old value \"min_voting_power\" to \"priority_high\"");
                migrated.push("min_voting_power");
            }
        }
        if let Some(power) = self.max_voting_power.take() {
            if self.priority_low.is_none() {
                self.priority_low = Some(power);
                info!("Updated old value \"max_voting_power\" to \"priority_low\"");
                migrated.push("max_voting_power");
            }
        }
        if !self.backup_authors.is_empty() {
            for entry in std::mem::take(&mut self.backup_authors) {
                if self.authors.iter().any(|a| a.name() == entry.name()) {
                    continue;
                }
                let rule = entry.into_rule().with_priority(PriorityTier::Low);
                self.authors.push(AuthorEntry::Rule(rule));
            }
            info!("Updated old value \"backup_authors\" to low-priority authors");
            migrated.push("backup_authors");
        }

        migrated
    }

    fn timespan(value: &Option<TimespanValue>, key: &str, default_secs: u64) -> ConfigResult<Duration> {
        match value {
            Some(value) => value.resolve(key),
            None => Ok(Duration::from_secs(default_secs)),
        }
    }

    fn fraction(value: &Option<FractionValue>, key: &str, default: f64) -> ConfigResult<f64> {
        match value {
            Some(value) => value.resolve(key),
            None => Ok(default),
        }
    }

    /// Build the validated policy snapshot.
    pub fn to_policy(&self) -> ConfigResult<CurationPolicy> {
        let thresholds = PriorityThresholds::new(
            Self::fraction(&self.priority_low, "priority_low", DEFAULT_PRIORITY_LOW)?,
            Self::fraction(&self.priority_normal, "priority_normal", DEFAULT_PRIORITY_NORMAL)?,
            Self::fraction(&self.priority_high, "priority_high", DEFAULT_PRIORITY_HIGH)?,
        )?
        .with_boundary(self.priority_boundary);

        CurationPolicy::builder()
            .post_age(
                Self::timespan(&self.min_post_age, "min_post_age", DEFAULT_MIN_POST_AGE_SECS)?,
                Self::timespan(&self.max_post_age, "max_post_age", DEFAULT_MAX_POST_AGE_SECS)?,
            )
            .thresholds(thresholds)
            .blacklist_authors(self.blacklist_authors.iter().cloned())
            .blacklist_categories(self.blacklist_categories.iter().cloned())
            .authors(self.authors.iter().cloned().map(AuthorEntry::into_rule))
            .delegates(self.delegates.iter().cloned().map(DelegateEntry::into_rule))
            .build()
    }

    /// Build and validate the rate window settings.
    pub fn rate_window_config(&self) -> ConfigResult<RateWindowConfig> {
        let defaults = RateWindowConfig::default();
        let config = RateWindowConfig {
            window: match &self.rate_window.window {
                Some(value) => value.resolve("rate_window.window")?,
                None => defaults.window,
            },
            max_entries: self.rate_window.max_entries,
            allotment: self.rate_window.allotment.unwrap_or(defaults.allotment),
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve intervals and executor breaker settings.
    pub fn runtime_settings(&self) -> ConfigResult<RuntimeSettings> {
        let settings = RuntimeSettings {
            database_path: self.database_path.clone(),
            dispatch_interval: Self::timespan(
                &self.dispatch_interval,
                "dispatch_interval",
                DEFAULT_DISPATCH_INTERVAL_SECS,
            )?,
            resource_refresh_interval: Self::timespan(
                &self.resource_refresh_interval,
                "resource_refresh_interval",
                DEFAULT_RESOURCE_REFRESH_SECS,
            )?,
            history_interval: Self::timespan(
                &self.history_interval,
                "history_interval",
                DEFAULT_HISTORY_INTERVAL_SECS,
            )?,
            executor_failure_threshold: self
                .executor_failure_threshold
                .unwrap_or(DEFAULT_EXECUTOR_FAILURE_THRESHOLD),
            executor_cooldown: Self::timespan(
                &self.executor_cooldown,
                "executor_cooldown",
                DEFAULT_EXECUTOR_COOLDOWN_SECS,
            )?,
            rate_window: self.rate_window_config()?,
        };

        for (key, interval) in [
            ("dispatch_interval", settings.dispatch_interval),
            ("resource_refresh_interval", settings.resource_refresh_interval),
            ("history_interval", settings.history_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "interval must be positive".to_string(),
                });
            }
        }
        if settings.executor_failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "executor_failure_threshold".to_string(),
                value: "0".to_string(),
                reason: "threshold must be at least 1".to_string(),
            });
        }
        if settings.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Required("database_path".to_string()));
        }
        Ok(settings)
    }

    /// Validate everything. Fatal errors must stop the curator from starting.
    pub fn validate(&self) -> ConfigResult<()> {
        self.to_policy()?;
        self.runtime_settings()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_fraction_parsing() {
        assert_eq!(parse_fraction("80%").unwrap(), 0.8);
        assert_eq!(parse_fraction("0.75").unwrap(), 0.75);
        assert!(parse_fraction("1").is_err());
        assert!(parse_fraction("abc%").is_err());
    }

    #[test]
    fn test_timespan_parsing() {
        assert_eq!(parse_timespan("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timespan("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timespan("2 days").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_timespan("1h 30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_timespan("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_timespan(" 1week ").unwrap(), Duration::from_secs(604_800));
        assert!(parse_timespan("").is_err());
        assert!(parse_timespan("-5").is_err());
        assert!(parse_timespan("5 fortnights").is_err());
        assert!(parse_timespan("minutes").is_err());
    }

    #[test]
    fn test_defaults_build_policy() {
        let config = CuratorConfig::default();
        let policy = config.to_policy().unwrap();
        assert_eq!(policy.min_post_age(), Duration::from_secs(60));
        assert_eq!(policy.max_post_age(), Duration::from_secs(172_800));
        assert_eq!(policy.thresholds().get(PriorityTier::High), 0.8);
        assert!(policy.is_blacklisted("x", "spam"));

        let settings = config.runtime_settings().unwrap();
        assert_eq!(settings.dispatch_interval, Duration::from_secs(10));
        assert_eq!(settings.resource_refresh_interval, Duration::from_secs(20));
        assert_eq!(settings.rate_window.allotment, 20);
        assert_eq!(settings.database_path, PathBuf::from("database/"));
    }

    #[test]
    fn test_yaml_with_mixed_rules() {
        let yaml = r#"
min_post_age: 2m
max_post_age: 1 day
priority_high: "75%"
priority_boundary: exclusive
authors:
  - alice
  - name: bob
    vote_replies: true
    weight: 50.0
    priority: high
delegates:
  - name: dan
    priority: low
rate_window:
  window: 12h
  allotment: 10
"#;
        let config = CuratorConfig::parse(yaml, ConfigFormat::Yaml).unwrap();
        let policy = config.to_policy().unwrap();

        assert_eq!(policy.min_post_age(), Duration::from_secs(120));
        assert_eq!(policy.thresholds().get(PriorityTier::High), 0.75);
        assert_eq!(policy.thresholds().boundary(), ThresholdBoundary::Exclusive);
        assert_eq!(policy.author("alice").unwrap().weight, 100.0);
        let bob = policy.author("bob").unwrap();
        assert!(bob.vote_replies);
        assert_eq!(bob.priority, PriorityTier::High);
        assert_eq!(policy.delegate("dan").unwrap().priority, PriorityTier::Low);

        let rate = config.rate_window_config().unwrap();
        assert_eq!(rate.window, Duration::from_secs(43_200));
        assert_eq!(rate.allotment, 10);
    }

    #[test]
    fn test_json_and_toml_formats() {
        let json = r#"{"database_path": "/tmp/curator", "authors": ["alice"], "priority_low": 1.0}"#;
        let config = CuratorConfig::parse(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/curator"));
        assert_eq!(config.to_policy().unwrap().thresholds().get(PriorityTier::Low), 1.0);

        let toml = r#"
dispatch_interval = "30s"
authors = ["alice"]

[rate_window]
max_entries = 20
"#;
        let config = CuratorConfig::parse(toml, ConfigFormat::Toml).unwrap();
        let settings = config.runtime_settings().unwrap();
        assert_eq!(settings.dispatch_interval, Duration::from_secs(30));
        assert_eq!(settings.rate_window.max_entries, Some(20));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")).unwrap(), ConfigFormat::Json);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("a.ini")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_legacy_keys_migrate() {
        let json = r#"{
            "vote_delay": 300,
            "min_voting_power": "70%",
            "max_voting_power": 0.99,
            "authors": ["alice"],
            "backup_authors": ["alice", "zed"]
        }"#;
        let config = CuratorConfig::parse(json, ConfigFormat::Json).unwrap();
        assert!(config.vote_delay.is_none());
        assert!(config.backup_authors.is_empty());

        let policy = config.to_policy().unwrap();
        assert_eq!(policy.min_post_age(), Duration::from_secs(300));
        assert_eq!(policy.thresholds().get(PriorityTier::High), 0.7);
        assert_eq!(policy.thresholds().get(PriorityTier::Low), 0.99);
        assert_eq!(policy.author("alice").unwrap().priority, PriorityTier::Normal);
        assert_eq!(policy.author("zed").unwrap().priority, PriorityTier::Low);
    }

    #[test]
    fn test_legacy_key_does_not_override_current() {
        let mut config = CuratorConfig {
            min_post_age: Some(TimespanValue::Seconds(30)),
            vote_delay: Some(TimespanValue::Seconds(300)),
            ..CuratorConfig::default()
        };
        assert!(config.migrate_legacy_keys().is_empty());
        assert_eq!(config.min_post_age, Some(TimespanValue::Seconds(30)));
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        let json = r#"{"priority_low": 0.5, "priority_normal": 0.9}"#;
        let config = CuratorConfig::parse(json, ConfigFormat::Json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonMonotonicThresholds { .. })
        ));

        let json = r#"{"priority_high": "80"}"#;
        let config = CuratorConfig::parse(json, ConfigFormat::Json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        let json = r#"{"min_post_age": "3 days"}"#;
        let config = CuratorConfig::parse(json, ConfigFormat::Json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::PostAgeOrder { .. })));

        let json = r#"{"rate_window": {"allotment": 0}}"#;
        let config = CuratorConfig::parse(json, ConfigFormat::Json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CURATOR_DATABASE_PATH", "/var/lib/curator"),
            ("CURATOR_DISPATCH_INTERVAL_SECS", "45"),
        ]
        .into_iter()
        .collect();
        let mut config = CuratorConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        let settings = config.runtime_settings().unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/var/lib/curator"));
        assert_eq!(settings.dispatch_interval, Duration::from_secs(45));

        let mut config = CuratorConfig::default();
        let err = config
            .apply_overrides(|key| (key == "CURATOR_DISPATCH_INTERVAL_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curator-config.yaml");
        std::fs::write(&path, "authors: [alice]\n").unwrap();
        let config = CuratorConfig::load(&path).unwrap();
        assert!(config.to_policy().unwrap().author("alice").is_some());

        let missing = CuratorConfig::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
