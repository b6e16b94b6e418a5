//! Admission and curation decisions
//!
//! Decisions never fail. Each returns a value carrying a reason string so
//! callers can log why an item was turned away.
//!
//! Tracking is cheap and reversible, so the tracking phase only applies the
//! coarse eligibility rules. The voting phase re-applies them, then checks
//! age and the resource budget against the matching rule's priority tier.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::content::ContentItem;
use crate::policy::{CurationPolicy, DelegateRule, PolicyHandle};

pub const REASON_CURATION_DISABLED: &str = "curation disabled";
pub const REASON_BLACKLISTED: &str = "blacklisted";
pub const REASON_TOO_OLD: &str = "too old";
pub const REASON_TOO_YOUNG: &str = "too young";
pub const REASON_UNKNOWN_AUTHOR: &str = "unknown author";
pub const REASON_REPLY: &str = "reply by author without vote_replies";
pub const REASON_NO_DELEGATES: &str = "no delegates have voted";
pub const REASON_AUTHOR_PRIORITY: &str = "author priority too low";
pub const REASON_DELEGATE_PRIORITY: &str = "no delegate with a high enough priority";
pub const REASON_RATE_EXHAUSTED: &str = "rate window allotment exhausted";

/// Outcome of a tracking check.
#[derive(Debug, Clone, PartialEq)]
pub struct ShouldTrack {
    pub track: bool,
    /// Empty when `track` is true
    pub reason: String,
}

impl ShouldTrack {
    fn accept() -> Self {
        Self {
            track: true,
            reason: String::new(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            track: false,
            reason: reason.into(),
        }
    }
}

/// Outcome of a voting check.
#[derive(Debug, Clone, PartialEq)]
pub struct ShouldVote {
    pub vote: bool,
    /// `false` means the item should be dropped from tracking
    pub track: bool,
    pub reason: String,
}

impl ShouldVote {
    fn approve() -> Self {
        Self {
            vote: true,
            track: true,
            reason: String::new(),
        }
    }

    fn retry_later(reason: impl Into<String>) -> Self {
        Self {
            vote: false,
            track: true,
            reason: reason.into(),
        }
    }

    fn drop_tracking(reason: impl Into<String>) -> Self {
        Self {
            vote: false,
            track: false,
            reason: reason.into(),
        }
    }
}

/// Throttle readings taken at the start of a decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteContext {
    pub now: DateTime<Utc>,
    /// Current resource budget fraction
    pub budget: f64,
    /// Rate window utilization; at or above 1.0 the allotment is used up
    pub rate_utilization: f64,
}

impl VoteContext {
    pub fn new(now: DateTime<Utc>, budget: f64, rate_utilization: f64) -> Self {
        Self {
            now,
            budget,
            rate_utilization,
        }
    }
}

/// Applies the current policy snapshot to content items.
#[derive(Debug, Clone)]
pub struct CurationEngine {
    policy: PolicyHandle,
}

impl CurationEngine {
    pub fn new(policy: PolicyHandle) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    /// Coarse eligibility: curation allowed, not blacklisted, not too old.
    pub fn should_track(&self, item: &ContentItem, now: DateTime<Utc>) -> ShouldTrack {
        eligibility(&self.policy.current(), item, now)
    }

    /// Eligibility plus a configured rule for the item's author.
    pub fn should_track_for_author(&self, item: &ContentItem, now: DateTime<Utc>) -> ShouldTrack {
        let policy = self.policy.current();
        let base = eligibility(&policy, item, now);
        if !base.track {
            return base;
        }
        match policy.author(&item.author) {
            None => ShouldTrack::reject(REASON_UNKNOWN_AUTHOR),
            Some(rule) if item.is_reply && !rule.vote_replies => ShouldTrack::reject(REASON_REPLY),
            Some(_) => ShouldTrack::accept(),
        }
    }

    /// Eligibility plus at least one configured delegate among the item's voters.
    pub fn should_track_for_delegate(&self, item: &ContentItem, now: DateTime<Utc>) -> ShouldTrack {
        let policy = self.policy.current();
        let base = eligibility(&policy, item, now);
        if !base.track {
            return base;
        }
        if voted_delegates(&policy, item).is_empty() {
            return ShouldTrack::reject(REASON_NO_DELEGATES);
        }
        ShouldTrack::accept()
    }

    /// Whether a tracked item should be voted on now.
    pub fn should_vote(&self, item: &ContentItem, ctx: &VoteContext) -> ShouldVote {
        let policy = self.policy.current();
        decide_vote(&policy, item, ctx)
    }

    /// Weight to vote with: the author rule's weight, else the largest weight
    /// among delegates that voted. `None` when neither applies.
    pub fn voting_weight(&self, item: &ContentItem) -> Option<f64> {
        let policy = self.policy.current();
        resolve_weight(&policy, item)
    }

    /// Decide and resolve the weight against one policy snapshot.
    pub fn evaluate(&self, item: &ContentItem, ctx: &VoteContext) -> (ShouldVote, Option<f64>) {
        let policy: Arc<CurationPolicy> = self.policy.current();
        let decision = decide_vote(&policy, item, ctx);
        let weight = if decision.vote {
            resolve_weight(&policy, item)
        } else {
            None
        };
        (decision, weight)
    }
}

fn eligibility(policy: &CurationPolicy, item: &ContentItem, now: DateTime<Utc>) -> ShouldTrack {
    if !item.allow_curation_rewards || !item.allow_votes {
        return ShouldTrack::reject(REASON_CURATION_DISABLED);
    }
    if policy.is_blacklisted(&item.author, &item.category) {
        return ShouldTrack::reject(REASON_BLACKLISTED);
    }
    if item.age_secs(now) > age_secs(policy.max_post_age()) {
        return ShouldTrack::reject(REASON_TOO_OLD);
    }
    ShouldTrack::accept()
}

fn age_secs(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn voted_delegates<'a>(policy: &'a CurationPolicy, item: &ContentItem) -> Vec<&'a DelegateRule> {
    item.active_voters
        .iter()
        .filter_map(|voter| policy.delegate(voter))
        .collect()
}

fn decide_vote(policy: &CurationPolicy, item: &ContentItem, ctx: &VoteContext) -> ShouldVote {
    let base = eligibility(policy, item, ctx.now);
    if !base.track {
        return ShouldVote::drop_tracking(base.reason);
    }
    if item.age_secs(ctx.now) < age_secs(policy.min_post_age()) {
        return ShouldVote::retry_later(REASON_TOO_YOUNG);
    }

    // vote_replies only gates tracking; a reply tracked through a delegate
    // still votes at its author's tier.
    let thresholds = policy.thresholds();
    let author_ok = policy
        .author(&item.author)
        .is_some_and(|rule| thresholds.admits(rule.priority, ctx.budget));

    let delegates = voted_delegates(policy, item);
    let delegate_ok = delegates
        .iter()
        .any(|rule| thresholds.admits(rule.priority, ctx.budget));

    if !author_ok && !delegate_ok {
        let delegate_reason = if delegates.is_empty() {
            REASON_NO_DELEGATES
        } else {
            REASON_DELEGATE_PRIORITY
        };
        return ShouldVote::retry_later(format!("{} and {}", REASON_AUTHOR_PRIORITY, delegate_reason));
    }

    if ctx.rate_utilization >= 1.0 {
        return ShouldVote::retry_later(REASON_RATE_EXHAUSTED);
    }

    ShouldVote::approve()
}

fn resolve_weight(policy: &CurationPolicy, item: &ContentItem) -> Option<f64> {
    if let Some(rule) = policy.author(&item.author) {
        return Some(rule.weight);
    }
    voted_delegates(policy, item)
        .into_iter()
        .map(|rule| rule.weight)
        .max_by(f64::total_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AuthorRule, PriorityThresholds, PriorityTier, ThresholdBoundary};
    use chrono::Duration;

    fn engine(policy: CurationPolicy) -> CurationEngine {
        CurationEngine::new(PolicyHandle::new(policy))
    }

    fn default_engine() -> CurationEngine {
        engine(
            CurationPolicy::builder()
                .author(AuthorRule::new("alice").with_priority(PriorityTier::High))
                .author(AuthorRule::new("carol").with_weight(50.0))
                .delegate(DelegateRule::new("dan").with_weight(30.0))
                .delegate(DelegateRule::new("erin").with_weight(80.0).with_priority(PriorityTier::Low))
                .build()
                .unwrap(),
        )
    }

    fn post(author: &str, age_secs: i64, now: DateTime<Utc>) -> ContentItem {
        ContentItem::new(author, "post", "life", now - Duration::seconds(age_secs))
    }

    #[test]
    fn test_too_young_then_approved() {
        let engine = default_engine();
        let now = Utc::now();
        let ctx = VoteContext::new(now, 0.85, 0.0);

        let young = post("alice", 30, now);
        let decision = engine.should_vote(&young, &ctx);
        assert_eq!(decision, ShouldVote::retry_later(REASON_TOO_YOUNG));

        let ready = post("alice", 90, now);
        assert_eq!(engine.should_vote(&ready, &ctx), ShouldVote::approve());
    }

    #[test]
    fn test_blacklisted_category_never_tracked() {
        let engine = default_engine();
        let now = Utc::now();
        let mut item = post("alice", 120, now);
        item.category = "spam".to_string();

        let decision = engine.should_track(&item, now);
        assert!(!decision.track);
        assert_eq!(decision.reason, REASON_BLACKLISTED);
        assert!(!engine.should_track_for_author(&item, now).track);

        let vote = engine.should_vote(&item, &VoteContext::new(now, 1.0, 0.0));
        assert!(!vote.vote);
        assert!(!vote.track);
    }

    #[test]
    fn test_budget_recovery_approves_same_item() {
        let engine = default_engine();
        let now = Utc::now();
        let item = post("alice", 600, now);

        let low = engine.should_vote(&item, &VoteContext::new(now, 0.75, 0.0));
        assert!(!low.vote);
        assert!(low.track);

        let recovered = engine.should_vote(&item, &VoteContext::new(now, 0.82, 0.0));
        assert!(recovered.vote);
    }

    #[test]
    fn test_curation_disabled_and_too_old_drop_tracking() {
        let engine = default_engine();
        let now = Utc::now();

        let mut disabled = post("alice", 120, now);
        disabled.allow_curation_rewards = false;
        assert_eq!(engine.should_track(&disabled, now).reason, REASON_CURATION_DISABLED);

        let old = post("alice", 3 * 24 * 60 * 60, now);
        let decision = engine.should_vote(&old, &VoteContext::new(now, 1.0, 0.0));
        assert_eq!(decision, ShouldVote::drop_tracking(REASON_TOO_OLD));
    }

    #[test]
    fn test_author_tracking_rules() {
        let engine = default_engine();
        let now = Utc::now();

        assert!(engine.should_track_for_author(&post("alice", 0, now), now).track);
        assert_eq!(
            engine.should_track_for_author(&post("mallory", 0, now), now).reason,
            REASON_UNKNOWN_AUTHOR
        );

        let reply = post("alice", 0, now).with_reply(true);
        assert_eq!(engine.should_track_for_author(&reply, now).reason, REASON_REPLY);
    }

    #[test]
    fn test_delegate_tracking_and_vote() {
        let engine = default_engine();
        let now = Utc::now();

        let unvoted = post("mallory", 120, now);
        assert_eq!(
            engine.should_track_for_delegate(&unvoted, now).reason,
            REASON_NO_DELEGATES
        );

        let voted = post("mallory", 120, now).with_voters(["zed", "dan"]);
        assert!(engine.should_track_for_delegate(&voted, now).track);

        // dan is normal priority (0.9)
        assert!(!engine.should_vote(&voted, &VoteContext::new(now, 0.85, 0.0)).vote);
        assert!(engine.should_vote(&voted, &VoteContext::new(now, 0.9, 0.0)).vote);
    }

    #[test]
    fn test_reply_tracked_by_delegate_votes_at_author_tier() {
        let engine = default_engine();
        let now = Utc::now();
        // alice is high priority without vote_replies, erin is a low delegate.
        let reply = post("alice", 600, now).with_reply(true).with_voters(["erin"]);
        assert!(!engine.should_track_for_author(&reply, now).track);
        assert!(engine.should_track_for_delegate(&reply, now).track);

        let (decision, weight) = engine.evaluate(&reply, &VoteContext::new(now, 0.85, 0.0));
        assert_eq!(decision, ShouldVote::approve());
        assert_eq!(weight, Some(100.0));

        let low = engine.should_vote(&reply, &VoteContext::new(now, 0.75, 0.0));
        assert!(!low.vote);
        assert!(low.track);
    }

    #[test]
    fn test_rate_window_exhaustion_keeps_tracking() {
        let engine = default_engine();
        let now = Utc::now();
        let item = post("alice", 600, now);

        let decision = engine.should_vote(&item, &VoteContext::new(now, 1.0, 1.0));
        assert_eq!(decision, ShouldVote::retry_later(REASON_RATE_EXHAUSTED));
        assert!(engine.should_vote(&item, &VoteContext::new(now, 1.0, 0.95)).vote);
    }

    #[test]
    fn test_weight_prefers_author_then_max_delegate() {
        let engine = default_engine();
        let now = Utc::now();

        let by_author = post("carol", 600, now).with_voters(["erin"]);
        assert_eq!(engine.voting_weight(&by_author), Some(50.0));

        let by_delegates = post("mallory", 600, now).with_voters(["dan", "erin"]);
        assert_eq!(engine.voting_weight(&by_delegates), Some(80.0));

        assert_eq!(engine.voting_weight(&post("mallory", 600, now)), None);

        let (decision, weight) = engine.evaluate(&by_delegates, &VoteContext::new(now, 1.0, 0.0));
        assert!(decision.vote);
        assert_eq!(weight, Some(80.0));
    }

    #[test]
    fn test_exclusive_boundary() {
        let thresholds = PriorityThresholds::new(0.95, 0.9, 0.8)
            .unwrap()
            .with_boundary(ThresholdBoundary::Exclusive);
        let engine = engine(
            CurationPolicy::builder()
                .thresholds(thresholds)
                .author(AuthorRule::new("alice").with_priority(PriorityTier::High))
                .build()
                .unwrap(),
        );
        let now = Utc::now();
        let item = post("alice", 600, now);

        assert!(!engine.should_vote(&item, &VoteContext::new(now, 0.8, 0.0)).vote);
        assert!(engine.should_vote(&item, &VoteContext::new(now, 0.8001, 0.0)).vote);
    }

    #[test]
    fn test_policy_reload_applies_to_next_decision() {
        let engine = default_engine();
        let now = Utc::now();
        let item = post("alice", 600, now);
        assert!(engine.should_track(&item, now).track);

        engine.policy().replace(
            CurationPolicy::builder()
                .blacklist_authors(["alice"])
                .build()
                .unwrap(),
        );
        let decision = engine.should_vote(&item, &VoteContext::new(now, 1.0, 0.0));
        assert_eq!(decision, ShouldVote::drop_tracking(REASON_BLACKLISTED));
    }
}
