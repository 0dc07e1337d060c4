// Error taxonomy for the warden.
//
// Only ConfigError is fatal. The others are per-message and get logged by
// whoever observes them.

use std::path::PathBuf;

/// Startup failure: the process must not begin handling messages.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("alert rule {rule_index} has invalid pattern #{pattern_index} '{pattern}': {source}")]
    InvalidPattern {
        rule_index: usize,
        pattern_index: usize,
        pattern: String,
        source: fancy_regex::Error,
    },
}

/// Role lookup failed for an author.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("error resolving roles for {author_id}: {reason}")]
pub struct ResolutionError {
    pub author_id: String,
    pub reason: String,
}

impl ResolutionError {
    pub fn new(author_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            reason: reason.into(),
        }
    }
}

/// A compiled pattern failed while running against a message.
#[derive(Debug, thiserror::Error)]
#[error("alert rule {rule_index} pattern #{pattern_index} failed to match: {source}")]
pub struct MatchError {
    pub rule_index: usize,
    pub pattern_index: usize,
    pub source: fancy_regex::Error,
}

/// An outbound send failed. Dropped after logging.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("error sending reply in channel {channel_id}: {reason}")]
    Reply { channel_id: String, reason: String },

    #[error("error sending DM to {user_id}: {reason}")]
    DirectMessage { user_id: String, reason: String },

    #[error("error writing outbound message: {0}")]
    Io(#[from] std::io::Error),

    #[error("error encoding outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}
