//! Curation policy snapshot
//!
//! A [`CurationPolicy`] is an immutable, validated view of the configured
//! rules. The engine never mutates it; reloading configuration builds a new
//! snapshot and swaps it into the [`PolicyHandle`] in one step, so a decision
//! in progress always sees a single consistent policy.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating policy. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Priority thresholds must be: low >= normal >= high (got low={low}, normal={normal}, high={high})")]
    NonMonotonicThresholds { low: f64, normal: f64, high: f64 },

    #[error("Threshold for {tier} priority must be within 0.0..=1.0, got {value}")]
    ThresholdOutOfRange { tier: PriorityTier, value: f64 },

    #[error("Minimum post age ({min:?}) cannot be more than maximum post age ({max:?})")]
    PostAgeOrder { min: Duration, max: Duration },

    #[error("No name was specified for {kind}")]
    MissingName { kind: &'static str },

    #[error("Weight for {name} must be non-zero and within -100.0..=100.0, got {weight}")]
    InvalidWeight { name: String, weight: f64 },

    #[error("{name} is configured more than once as {kind}")]
    DuplicateRule { kind: &'static str, name: String },

    #[error("Invalid config value {value:?} for key {key:?}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Configuration value for {0:?} is required")]
    Required(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Priority tier of an author or delegate.
///
/// Lower priority requires more spare resource budget before an item is
/// actioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Low,
    #[default]
    Normal,
    High,
}

impl PriorityTier {
    pub fn all() -> &'static [PriorityTier] {
        &[PriorityTier::Low, PriorityTier::Normal, PriorityTier::High]
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::Low => write!(f, "low"),
            PriorityTier::Normal => write!(f, "normal"),
            PriorityTier::High => write!(f, "high"),
        }
    }
}

/// How the current budget is compared against a tier threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBoundary {
    /// `budget >= threshold`
    #[default]
    Inclusive,
    /// `budget > threshold`
    Exclusive,
}

/// Minimum resource budget fraction required per tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityThresholds {
    low: f64,
    normal: f64,
    high: f64,
    boundary: ThresholdBoundary,
}

impl PriorityThresholds {
    /// Validate and build thresholds. Rejects anything but `low >= normal >= high`.
    pub fn new(low: f64, normal: f64, high: f64) -> ConfigResult<Self> {
        for (tier, value) in [
            (PriorityTier::Low, low),
            (PriorityTier::Normal, normal),
            (PriorityTier::High, high),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { tier, value });
            }
        }
        if !(low >= normal && normal >= high) {
            return Err(ConfigError::NonMonotonicThresholds { low, normal, high });
        }
        Ok(Self {
            low,
            normal,
            high,
            boundary: ThresholdBoundary::Inclusive,
        })
    }

    pub fn with_boundary(mut self, boundary: ThresholdBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn get(&self, tier: PriorityTier) -> f64 {
        match tier {
            PriorityTier::Low => self.low,
            PriorityTier::Normal => self.normal,
            PriorityTier::High => self.high,
        }
    }

    pub fn boundary(&self) -> ThresholdBoundary {
        self.boundary
    }

    /// Whether `budget` is enough to act on an item of `tier`.
    pub fn admits(&self, tier: PriorityTier, budget: f64) -> bool {
        let threshold = self.get(tier);
        match self.boundary {
            ThresholdBoundary::Inclusive => budget >= threshold,
            ThresholdBoundary::Exclusive => budget > threshold,
        }
    }
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            low: 0.95,
            normal: 0.9,
            high: 0.8,
            boundary: ThresholdBoundary::Inclusive,
        }
    }
}

/// An author whose content is curated directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRule {
    pub name: String,
    #[serde(default)]
    pub priority: PriorityTier,
    #[serde(default)]
    pub vote_replies: bool,
    /// Vote weight in percent; negative values downvote.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// An account whose own votes are treated as a curation signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateRule {
    pub name: String,
    #[serde(default)]
    pub priority: PriorityTier,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

pub(crate) fn default_weight() -> f64 {
    100.0
}

impl AuthorRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: PriorityTier::Normal,
            vote_replies: false,
            weight: default_weight(),
        }
    }

    pub fn with_priority(mut self, priority: PriorityTier) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_vote_replies(mut self, vote_replies: bool) -> Self {
        self.vote_replies = vote_replies;
        self
    }
}

impl DelegateRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: PriorityTier::Normal,
            weight: default_weight(),
        }
    }

    pub fn with_priority(mut self, priority: PriorityTier) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

fn validate_rule(kind: &'static str, name: &str, weight: f64) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::MissingName { kind });
    }
    if !weight.is_finite() || weight == 0.0 || !(-100.0..=100.0).contains(&weight) {
        return Err(ConfigError::InvalidWeight {
            name: name.to_string(),
            weight,
        });
    }
    Ok(())
}

/// Immutable, validated curation rules.
#[derive(Debug, Clone)]
pub struct CurationPolicy {
    min_post_age: Duration,
    max_post_age: Duration,
    thresholds: PriorityThresholds,
    blacklist_authors: HashSet<String>,
    blacklist_categories: HashSet<String>,
    authors: HashMap<String, AuthorRule>,
    delegates: HashMap<String, DelegateRule>,
}

impl CurationPolicy {
    pub fn builder() -> CurationPolicyBuilder {
        CurationPolicyBuilder::default()
    }

    pub fn min_post_age(&self) -> Duration {
        self.min_post_age
    }

    pub fn max_post_age(&self) -> Duration {
        self.max_post_age
    }

    pub fn thresholds(&self) -> &PriorityThresholds {
        &self.thresholds
    }

    pub fn author(&self, name: &str) -> Option<&AuthorRule> {
        self.authors.get(name)
    }

    pub fn delegate(&self, name: &str) -> Option<&DelegateRule> {
        self.delegates.get(name)
    }

    pub fn authors(&self) -> impl Iterator<Item = &AuthorRule> {
        self.authors.values()
    }

    pub fn delegates(&self) -> impl Iterator<Item = &DelegateRule> {
        self.delegates.values()
    }

    pub fn is_blacklisted(&self, author: &str, category: &str) -> bool {
        self.blacklist_authors.contains(author) || self.blacklist_categories.contains(category)
    }
}

/// Builder that validates on [`CurationPolicyBuilder::build`].
#[derive(Debug, Clone)]
pub struct CurationPolicyBuilder {
    min_post_age: Duration,
    max_post_age: Duration,
    thresholds: PriorityThresholds,
    blacklist_authors: Vec<String>,
    blacklist_categories: Vec<String>,
    authors: Vec<AuthorRule>,
    delegates: Vec<DelegateRule>,
}

impl Default for CurationPolicyBuilder {
    fn default() -> Self {
        Self {
            min_post_age: Duration::from_secs(60),
            max_post_age: Duration::from_secs(2 * 24 * 60 * 60),
            thresholds: PriorityThresholds::default(),
            blacklist_authors: Vec::new(),
            blacklist_categories: vec!["spam".to_string()],
            authors: Vec::new(),
            delegates: Vec::new(),
        }
    }
}

impl CurationPolicyBuilder {
    pub fn post_age(mut self, min: Duration, max: Duration) -> Self {
        self.min_post_age = min;
        self.max_post_age = max;
        self
    }

    pub fn thresholds(mut self, thresholds: PriorityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn blacklist_authors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist_authors = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn blacklist_categories<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist_categories = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn author(mut self, rule: AuthorRule) -> Self {
        self.authors.push(rule);
        self
    }

    pub fn authors(mut self, rules: impl IntoIterator<Item = AuthorRule>) -> Self {
        self.authors.extend(rules);
        self
    }

    pub fn delegate(mut self, rule: DelegateRule) -> Self {
        self.delegates.push(rule);
        self
    }

    pub fn delegates(mut self, rules: impl IntoIterator<Item = DelegateRule>) -> Self {
        self.delegates.extend(rules);
        self
    }

    pub fn build(self) -> ConfigResult<CurationPolicy> {
        if self.min_post_age > self.max_post_age {
            return Err(ConfigError::PostAgeOrder {
                min: self.min_post_age,
                max: self.max_post_age,
            });
        }

        let mut authors = HashMap::new();
        for rule in self.authors {
            validate_rule("author", &rule.name, rule.weight)?;
            if authors.contains_key(&rule.name) {
                return Err(ConfigError::DuplicateRule {
                    kind: "author",
                    name: rule.name,
                });
            }
            authors.insert(rule.name.clone(), rule);
        }

        let mut delegates = HashMap::new();
        for rule in self.delegates {
            validate_rule("delegate", &rule.name, rule.weight)?;
            if delegates.contains_key(&rule.name) {
                return Err(ConfigError::DuplicateRule {
                    kind: "delegate",
                    name: rule.name,
                });
            }
            delegates.insert(rule.name.clone(), rule);
        }

        Ok(CurationPolicy {
            min_post_age: self.min_post_age,
            max_post_age: self.max_post_age,
            thresholds: self.thresholds,
            blacklist_authors: self.blacklist_authors.into_iter().collect(),
            blacklist_categories: self.blacklist_categories.into_iter().collect(),
            authors,
            delegates,
        })
    }
}

/// Shared handle to the current policy snapshot.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    current: Arc<RwLock<Arc<CurationPolicy>>>,
}

impl PolicyHandle {
    pub fn new(policy: CurationPolicy) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<CurationPolicy> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Replace the snapshot. Decisions already holding the old one finish with it.
    pub fn replace(&self, policy: CurationPolicy) {
        let next = Arc::new(policy);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_must_be_monotonic() {
        assert!(PriorityThresholds::new(0.95, 0.9, 0.8).is_ok());
        assert!(PriorityThresholds::new(0.9, 0.9, 0.9).is_ok());

        let err = PriorityThresholds::new(0.5, 0.9, 0.8).unwrap_err();
        assert!(matches!(err, ConfigError::NonMonotonicThresholds { .. }));

        let err = PriorityThresholds::new(0.95, 0.7, 0.8).unwrap_err();
        assert!(matches!(err, ConfigError::NonMonotonicThresholds { .. }));
    }

    #[test]
    fn test_thresholds_range() {
        let err = PriorityThresholds::new(1.5, 0.9, 0.8).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ThresholdOutOfRange {
                tier: PriorityTier::Low,
                ..
            }
        ));
    }

    #[test]
    fn test_boundary_modes() {
        let inclusive = PriorityThresholds::new(0.95, 0.9, 0.8).unwrap();
        assert!(inclusive.admits(PriorityTier::High, 0.8));
        assert!(!inclusive.admits(PriorityTier::Normal, 0.85));

        let exclusive = inclusive.with_boundary(ThresholdBoundary::Exclusive);
        assert!(!exclusive.admits(PriorityTier::High, 0.8));
        assert!(exclusive.admits(PriorityTier::High, 0.8001));
    }

    #[test]
    fn test_post_age_order() {
        let err = CurationPolicy::builder()
            .post_age(Duration::from_secs(600), Duration::from_secs(60))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::PostAgeOrder { .. }));
    }

    #[test]
    fn test_rule_validation() {
        let err = CurationPolicy::builder()
            .author(AuthorRule::new(""))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingName { kind: "author" }));

        let err = CurationPolicy::builder()
            .delegate(DelegateRule::new("bob").with_weight(150.0))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeight { .. }));

        let err = CurationPolicy::builder()
            .author(AuthorRule::new("alice"))
            .author(AuthorRule::new("alice"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRule { .. }));
    }

    #[test]
    fn test_default_blacklist_has_spam() {
        let policy = CurationPolicy::builder().build().unwrap();
        assert!(policy.is_blacklisted("anyone", "spam"));
        assert!(!policy.is_blacklisted("anyone", "life"));
    }

    #[test]
    fn test_handle_replace() {
        let handle = PolicyHandle::new(CurationPolicy::builder().build().unwrap());
        let before = handle.current();
        assert!(before.author("alice").is_none());

        handle.replace(
            CurationPolicy::builder()
                .author(AuthorRule::new("alice"))
                .build()
                .unwrap(),
        );
        assert!(handle.current().author("alice").is_some());
        // The old snapshot is untouched.
        assert!(before.author("alice").is_none());
    }
}
