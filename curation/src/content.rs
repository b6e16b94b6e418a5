//! Content items observed on chain
//!
//! A [`ContentItem`] is an immutable snapshot of a post or reply as it was
//! when fetched. Items are never mutated in place: the dispatcher re-fetches
//! the current snapshot before every decision because the set of accounts
//! that voted on an item keeps changing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Globally unique content identifier in the canonical `@author/permlink` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Build the identifier for `author`'s content at `permlink`.
    pub fn new(author: &str, permlink: &str) -> Self {
        Self(format!("@{}/{}", author, permlink))
    }

    /// Parse an identifier, accepting both `@author/permlink` and `author/permlink`.
    pub fn parse(raw: &str) -> Result<Self, MalformedItem> {
        let trimmed = raw.strip_prefix('@').unwrap_or(raw);
        match trimmed.split_once('/') {
            Some((author, permlink)) if !author.is_empty() && !permlink.is_empty() => {
                Ok(Self::new(author, permlink))
            }
            _ => Err(MalformedItem::InvalidIdentifier(raw.to_string())),
        }
    }

    /// Author portion of the identifier.
    pub fn author(&self) -> &str {
        self.split().0
    }

    /// Permlink portion of the identifier.
    pub fn permlink(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        let trimmed = self.0.strip_prefix('@').unwrap_or(&self.0);
        trimmed.split_once('/').unwrap_or((trimmed, ""))
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An item that cannot be evaluated because required fields are missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedItem {
    #[error("item has no author")]
    MissingAuthor,

    #[error("item has no permlink")]
    MissingPermlink,

    #[error("invalid content identifier: {0}")]
    InvalidIdentifier(String),

    #[error("identifier {identifier} does not belong to author {author}")]
    AuthorMismatch { identifier: String, author: String },
}

/// A snapshot of a post or reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub author: String,
    pub category: String,
    /// Creation time on chain
    pub created: DateTime<Utc>,
    pub is_reply: bool,
    #[serde(default = "default_true")]
    pub allow_curation_rewards: bool,
    #[serde(default = "default_true")]
    pub allow_votes: bool,
    /// Accounts that have voted on this item so far, if known.
    #[serde(default)]
    pub active_voters: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ContentItem {
    /// Create a top-level post snapshot with curation and votes allowed.
    pub fn new(
        author: &str,
        permlink: &str,
        category: &str,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ContentId::new(author, permlink),
            author: author.to_string(),
            category: category.to_string(),
            created,
            is_reply: false,
            allow_curation_rewards: true,
            allow_votes: true,
            active_voters: Vec::new(),
        }
    }

    pub fn with_reply(mut self, is_reply: bool) -> Self {
        self.is_reply = is_reply;
        self
    }

    pub fn with_voters<I, S>(mut self, voters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_voters = voters.into_iter().map(Into::into).collect();
        self
    }

    /// Check that the fields the admission rules depend on are present.
    pub fn validate(&self) -> Result<(), MalformedItem> {
        if self.author.is_empty() {
            return Err(MalformedItem::MissingAuthor);
        }
        if self.id.permlink().is_empty() {
            return Err(MalformedItem::MissingPermlink);
        }
        if self.id.author() != self.author {
            return Err(MalformedItem::AuthorMismatch {
                identifier: self.id.to_string(),
                author: self.author.clone(),
            });
        }
        Ok(())
    }

    /// Seconds elapsed between creation and `now` (negative if created in the future).
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created).num_seconds()
    }

    /// Whether `voter` appears among the accounts that voted on this item.
    pub fn has_voter(&self, voter: &str) -> bool {
        self.active_voters.iter().any(|v| v == voter)
    }
}

/// A vote operation seen in the block stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOperation {
    pub voter: String,
    pub author: String,
    pub permlink: String,
    /// Signed vote weight in basis points as broadcast (-10000..=10000).
    #[serde(default)]
    pub weight: i32,
}

impl VoteOperation {
    pub fn content_id(&self) -> ContentId {
        ContentId::new(&self.author, &self.permlink)
    }
}

/// Operations the ingestion actor reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A post or reply was published or edited.
    Comment(ContentItem),
    /// Someone voted on a post.
    Vote(VoteOperation),
}

impl ChainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::Comment(_) => "comment",
            ChainEvent::Vote(_) => "vote",
        }
    }
}
