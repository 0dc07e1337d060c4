// Alert model types: rule configuration, link policy and the action descriptor.

use serde::{Deserialize, Serialize};

use crate::core::error::{MatchError, ResolutionError};

/// One configured alert rule as it appears in config.json.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertRuleConfig {
    /// Whole-word keywords, joined into one alternation
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Raw regex patterns; when present, keywords are ignored
    #[serde(default)]
    pub regex_patterns: Vec<String>,
    /// Text of the warning reply. Empty means the rule never fires.
    #[serde(default)]
    pub warning_message: String,
    #[serde(default)]
    pub external_link_required: bool,
    #[serde(default)]
    pub required_roles: Vec<String>,
    #[serde(default)]
    pub excluded_roles: Vec<String>,
    /// Skip authors whose membership is older than this many days.
    /// Zero or negative means no limit.
    #[serde(default)]
    pub omit_members_older_than_days: Option<i64>,
}

impl AlertRuleConfig {
    /// Settle matcher precedence, drop blank entries and unset a day limit <= 0.
    ///
    /// A non-empty `regex_patterns` list wins over `keywords` even when every
    /// pattern is blank, in which case the rule ends up with no matcher.
    /// Older configs used `[""]` for "any role" and `0` for "no age limit";
    /// a blank anywhere in `required_roles` lifts the whole restriction.
    pub fn normalize(&mut self) {
        if !self.regex_patterns.is_empty() {
            self.keywords.clear();
        }
        self.keywords.retain(|k| !k.trim().is_empty());
        self.regex_patterns.retain(|p| !p.trim().is_empty());
        if self.required_roles.iter().any(|r| r.trim().is_empty()) {
            self.required_roles.clear();
        }
        self.excluded_roles.retain(|r| !r.trim().is_empty());
        if self.omit_members_older_than_days.is_some_and(|d| d <= 0) {
            self.omit_members_older_than_days = None;
        }
    }

    pub fn has_content_matcher(&self) -> bool {
        !self.keywords.is_empty() || !self.regex_patterns.is_empty()
    }
}

/// How the external-link gate treats URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPolicy {
    /// Any http(s) URL satisfies the gate
    #[default]
    AnyUrl,
    /// Links to messages or channels of the current guild do not count
    ExcludeGuildMessageLinks,
}

/// Delivery channel for a fired action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Reply in the same channel, referencing the original message
    InlineReply,
    /// Private message to the author
    DirectMessage,
}

/// What caused an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Rule { index: usize },
    MemberJoin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub trigger: Trigger,
    pub delivery: Delivery,
    pub text: String,
}

/// Outcome of handling one event: at most one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionResult {
    NoAction,
    Fired(Action),
}

impl ActionResult {
    pub fn rule_reply(index: usize, text: impl Into<String>) -> Self {
        Self::Fired(Action {
            trigger: Trigger::Rule { index },
            delivery: Delivery::InlineReply,
            text: text.into(),
        })
    }

    pub fn is_no_action(&self) -> bool {
        matches!(self, Self::NoAction)
    }

    pub fn fired_rule(&self) -> Option<usize> {
        match self {
            Self::Fired(Action {
                trigger: Trigger::Rule { index },
                ..
            }) => Some(*index),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Fired(action) => Some(&action.text),
            Self::NoAction => None,
        }
    }
}

/// DM sent to members when they join the guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinWarning {
    message: String,
}

impl JoinWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Only fires when a message is configured.
    pub fn action(&self) -> ActionResult {
        if self.message.is_empty() {
            return ActionResult::NoAction;
        }
        ActionResult::Fired(Action {
            trigger: Trigger::MemberJoin,
            delivery: Delivery::DirectMessage,
            text: self.message.clone(),
        })
    }
}

/// Non-fatal problem hit while evaluating one message.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationIssue {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Result of running the rule engine over one message.
#[derive(Debug)]
pub struct Evaluation {
    pub action: ActionResult,
    pub issues: Vec<EvaluationIssue>,
}
