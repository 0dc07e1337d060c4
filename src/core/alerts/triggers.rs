// Non-content gates for alert rules.
//
// Gates run cheapest first: inert check, membership age, external link, then
// the role gates. Role gates are split out so the engine only resolves roles
// when a rule actually reaches them.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use super::matcher::CompiledRule;
use super::model::LinkPolicy;
use crate::core::model::MessageContext;

lazy_static! {
    static ref URL_REGEX: Regex =
        Regex::new(r"https?://[^\s/$.?#].[^\s]*").expect("Invalid URL regex");
    static ref GUILD_LINK_REGEX: Regex =
        Regex::new(r"^https?://(?:www\.)?discord(?:app)?\.com/channels/([^/\s]+)/")
            .expect("Invalid guild link regex");
}

/// Why a rule was or wasn't eligible for a content match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Inert,
    MemberTooOld,
    MissingLink,
    ExcludedRole,
    MissingRequiredRole,
}

impl GateOutcome {
    pub fn passed(self) -> bool {
        self == Self::Pass
    }
}

/// Per-message inputs shared by every rule's gates.
pub struct GateContext<'a> {
    pub message: &'a MessageContext,
    /// Message content, lower-cased once
    pub lowered: &'a str,
    pub now: DateTime<Utc>,
    pub link_policy: LinkPolicy,
}

/// Gates 1-3: inert, membership age, external link.
pub fn check_message_gates(rule: &CompiledRule, ctx: &GateContext) -> GateOutcome {
    if rule.is_inert() {
        return GateOutcome::Inert;
    }

    if member_too_old(
        rule.omit_members_older_than_days,
        ctx.message.author_joined_at,
        ctx.now,
    ) {
        return GateOutcome::MemberTooOld;
    }

    if rule.external_link_required
        && !contains_external_link(ctx.lowered, ctx.link_policy, ctx.message.guild_id.as_deref())
    {
        return GateOutcome::MissingLink;
    }

    GateOutcome::Pass
}

/// Gates 4-5: excluded roles win over required roles.
pub fn check_role_gates(rule: &CompiledRule, roles: &HashSet<String>) -> GateOutcome {
    if !rule.excluded_roles.is_empty() && !rule.excluded_roles.is_disjoint(roles) {
        return GateOutcome::ExcludedRole;
    }
    if !rule.required_roles.is_empty() && rule.required_roles.is_disjoint(roles) {
        return GateOutcome::MissingRequiredRole;
    }
    GateOutcome::Pass
}

/// All five gates with an already-resolved role set.
pub fn passes_non_content_gates(
    rule: &CompiledRule,
    ctx: &GateContext,
    roles: &HashSet<String>,
) -> bool {
    check_message_gates(rule, ctx).passed() && check_role_gates(rule, roles).passed()
}

/// Time since joining, strictly longer than the limit in days.
///
/// An unknown join date never exempts the author. A limit too large to
/// represent as a duration never does either.
pub fn member_too_old(
    limit_days: Option<i64>,
    joined_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match (limit_days.and_then(Duration::try_days), joined_at) {
        (Some(limit), Some(joined)) => now.signed_duration_since(joined) > limit,
        _ => false,
    }
}

/// Whether `content` holds an http(s) URL that counts under `policy`.
pub fn contains_external_link(content: &str, policy: LinkPolicy, guild_id: Option<&str>) -> bool {
    match policy {
        LinkPolicy::AnyUrl => URL_REGEX.is_match(content),
        LinkPolicy::ExcludeGuildMessageLinks => URL_REGEX
            .find_iter(content)
            .any(|url| !is_own_guild_link(url.as_str(), guild_id)),
    }
}

fn is_own_guild_link(url: &str, guild_id: Option<&str>) -> bool {
    let Some(guild_id) = guild_id else {
        return false;
    };
    GUILD_LINK_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .is_some_and(|linked| linked.as_str().eq_ignore_ascii_case(guild_id))
}
