// Rule engine - walks the ordered rule list and returns the first rule that fires.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::matcher::{compile_rules, CompiledRule, MatcherOptions};
use super::model::{ActionResult, Evaluation, EvaluationIssue, LinkPolicy};
use super::triggers::{check_message_gates, check_role_gates, GateContext, GateOutcome};
use crate::core::config::WardenConfig;
use crate::core::error::ConfigError;
use crate::core::model::MessageContext;
use crate::core::roles::RoleResolver;

/// Compiled, immutable rule set. Share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    link_policy: LinkPolicy,
}

impl RuleEngine {
    pub fn new(rules: Vec<CompiledRule>, link_policy: LinkPolicy) -> Self {
        Self { rules, link_policy }
    }

    /// Compile every alert rule in the config. Any bad pattern is fatal.
    pub fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        let options = MatcherOptions {
            backtrack_limit: config.backtrack_limit,
        };
        let rules = compile_rules(&config.alert_rules, options)?;
        Ok(Self::new(rules, config.link_policy))
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn link_policy(&self) -> LinkPolicy {
        self.link_policy
    }

    pub async fn evaluate<R: RoleResolver>(&self, message: &MessageContext, resolver: &R) -> Evaluation {
        self.evaluate_at(message, resolver, Utc::now()).await
    }

    /// Evaluate one message against the rules, in order, as of `now`.
    ///
    /// First rule whose gates pass and whose matcher hits wins. Role lookup and
    /// matcher failures are recorded as issues and never abort the walk.
    pub async fn evaluate_at<R: RoleResolver>(
        &self,
        message: &MessageContext,
        resolver: &R,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let mut issues = Vec::new();

        if message.is_bot {
            return Evaluation {
                action: ActionResult::NoAction,
                issues,
            };
        }

        let lowered = message.content.to_lowercase();
        let ctx = GateContext {
            message,
            lowered: &lowered,
            now,
            link_policy: self.link_policy,
        };
        let mut roles: Option<HashSet<String>> = None;

        for rule in &self.rules {
            let outcome = check_message_gates(rule, &ctx);
            if !outcome.passed() {
                debug!("alert rule {} skipped: {:?}", rule.index, outcome);
                continue;
            }

            if rule.needs_roles() {
                let held: &HashSet<String> = match roles {
                    Some(ref held) => held,
                    None => roles.insert(resolve_or_empty(resolver, message, &mut issues).await),
                };
                let outcome = check_role_gates(rule, held);
                if outcome != GateOutcome::Pass {
                    debug!("alert rule {} skipped: {:?}", rule.index, outcome);
                    continue;
                }
            }

            match rule.first_match(&lowered) {
                Ok(Some(pattern_index)) => {
                    info!(
                        "alert rule {} fired on message {} by {} (pattern #{})",
                        rule.index, message.message_id, message.author_id, pattern_index
                    );
                    return Evaluation {
                        action: ActionResult::rule_reply(rule.index, rule.warning_message.clone()),
                        issues,
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Skipping alert rule: {}", err);
                    issues.push(EvaluationIssue::Match(err));
                }
            }
        }

        Evaluation {
            action: ActionResult::NoAction,
            issues,
        }
    }
}

/// A failed lookup degrades to "no roles" so the remaining rules still run.
async fn resolve_or_empty<R: RoleResolver>(
    resolver: &R,
    message: &MessageContext,
    issues: &mut Vec<EvaluationIssue>,
) -> HashSet<String> {
    match resolver
        .resolve_roles(message.guild_id.as_deref(), &message.author_id)
        .await
    {
        Ok(roles) => roles,
        Err(err) => {
            warn!("Error fetching member roles: {}", err);
            issues.push(EvaluationIssue::Resolution(err));
            HashSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::AlertRuleConfig;
    use crate::core::error::ResolutionError;
    use crate::core::roles::StaticRoles;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts lookups and optionally fails them.
    struct CountingRoles {
        inner: StaticRoles,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingRoles {
        fn new(inner: StaticRoles) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(StaticRoles::new())
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RoleResolver for CountingRoles {
        async fn resolve_roles(
            &self,
            guild_id: Option<&str>,
            author_id: &str,
        ) -> Result<HashSet<String>, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolutionError::new(author_id, "member not found"));
            }
            self.inner.resolve_roles(guild_id, author_id).await
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn keyword_rule(words: &[&str], warning: &str) -> AlertRuleConfig {
        AlertRuleConfig {
            keywords: words.iter().map(|w| w.to_string()).collect(),
            warning_message: warning.to_string(),
            ..Default::default()
        }
    }

    fn engine(rules: Vec<AlertRuleConfig>) -> RuleEngine {
        let config = WardenConfig {
            alert_rules: rules,
            ..Default::default()
        };
        RuleEngine::from_config(&config).unwrap()
    }

    fn message(content: &str) -> MessageContext {
        MessageContext {
            message_id: "m1".to_string(),
            channel_id: "c1".to_string(),
            guild_id: Some("g1".to_string()),
            author_id: "u1".to_string(),
            is_bot: false,
            content: content.to_string(),
            author_joined_at: Some(now() - Duration::days(2)),
        }
    }

    async fn run(engine: &RuleEngine, msg: &MessageContext, roles: &CountingRoles) -> Evaluation {
        engine.evaluate_at(msg, roles, now()).await
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let engine = engine(vec![keyword_rule(&["foo"], "A"), keyword_rule(&["foo"], "B")]);
        let roles = CountingRoles::new(StaticRoles::new());

        let eval = run(&engine, &message("foo"), &roles).await;
        assert_eq!(eval.action, ActionResult::rule_reply(0, "A"));
        assert!(eval.issues.is_empty());
    }

    #[tokio::test]
    async fn test_narrow_exception_before_catch_all() {
        let mut exception = keyword_rule(&["invite"], "Mods: carry on");
        exception.required_roles = vec!["Moderator".to_string()];
        let engine = engine(vec![exception, keyword_rule(&["invite"], "No invites")]);

        let plain = CountingRoles::new(StaticRoles::new());
        let eval = run(&engine, &message("Invite link inside"), &plain).await;
        assert_eq!(eval.action.text(), Some("No invites"));

        let moderator = CountingRoles::new(StaticRoles::new().with_roles("u1", ["Moderator"]));
        let eval = run(&engine, &message("Invite link inside"), &moderator).await;
        assert_eq!(eval.action.fired_rule(), Some(0));
    }

    #[tokio::test]
    async fn test_substring_does_not_fire() {
        let engine = engine(vec![keyword_rule(&["ban"], "no bans")]);
        let roles = CountingRoles::new(StaticRoles::new());

        assert!(run(&engine, &message("I like banana"), &roles).await.action.is_no_action());
        assert_eq!(
            run(&engine, &message("BAN him"), &roles).await.action.fired_rule(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_self_message_never_fires() {
        let engine = engine(vec![keyword_rule(&["foo"], "A")]);
        let roles = CountingRoles::new(StaticRoles::new());
        let mut msg = message("foo");
        msg.is_bot = true;

        let eval = run(&engine, &msg, &roles).await;
        assert!(eval.action.is_no_action());
        assert_eq!(roles.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_warning_never_fires() {
        let engine = engine(vec![keyword_rule(&["foo"], "")]);
        let roles = CountingRoles::new(StaticRoles::new());
        assert!(run(&engine, &message("foo"), &roles).await.action.is_no_action());
    }

    #[tokio::test]
    async fn test_required_roles_block_authors_without_them() {
        let mut rule = keyword_rule(&["foo"], "A");
        rule.required_roles = vec!["New".to_string(), "Guest".to_string()];
        let engine = engine(vec![rule]);

        let without = CountingRoles::new(StaticRoles::new().with_roles("u1", ["Member"]));
        assert!(run(&engine, &message("foo"), &without).await.action.is_no_action());

        let with = CountingRoles::new(StaticRoles::new().with_roles("u1", ["Guest"]));
        assert_eq!(run(&engine, &message("foo"), &with).await.action.fired_rule(), Some(0));
    }

    #[tokio::test]
    async fn test_blank_required_role_lifts_the_restriction() {
        let mut rule = keyword_rule(&["foo"], "A");
        rule.required_roles = vec![String::new(), "Mod".to_string()];
        let engine = engine(vec![rule]);

        let roles = CountingRoles::new(StaticRoles::new());
        let eval = run(&engine, &message("foo"), &roles).await;
        assert_eq!(eval.action.fired_rule(), Some(0));
        assert_eq!(roles.calls(), 0);
    }

    #[tokio::test]
    async fn test_excluded_roles_block_even_with_required() {
        let mut rule = keyword_rule(&["foo"], "A");
        rule.required_roles = vec!["Member".to_string()];
        rule.excluded_roles = vec!["Staff".to_string()];
        let engine = engine(vec![rule]);

        let roles = CountingRoles::new(StaticRoles::new().with_roles("u1", ["Member", "Staff"]));
        assert!(run(&engine, &message("foo"), &roles).await.action.is_no_action());
    }

    #[tokio::test]
    async fn test_membership_age_boundary() {
        let mut rule = keyword_rule(&["foo"], "A");
        rule.omit_members_older_than_days = Some(5);
        let engine = engine(vec![rule]);
        let roles = CountingRoles::new(StaticRoles::new());

        let mut msg = message("foo");
        msg.author_joined_at = Some(now() - Duration::days(5));
        assert_eq!(run(&engine, &msg, &roles).await.action.fired_rule(), Some(0));

        msg.author_joined_at = Some(now() - Duration::days(6));
        assert!(run(&engine, &msg, &roles).await.action.is_no_action());
    }

    #[tokio::test]
    async fn test_link_required() {
        let mut rule = keyword_rule(&["check"], "links need context");
        rule.external_link_required = true;
        let engine = engine(vec![rule]);
        let roles = CountingRoles::new(StaticRoles::new());

        let eval = run(&engine, &message("check this out https://example.com/x"), &roles).await;
        assert_eq!(eval.action.fired_rule(), Some(0));

        let eval = run(&engine, &message("check: no link here"), &roles).await;
        assert!(eval.action.is_no_action());
    }

    #[tokio::test]
    async fn test_roles_resolved_once_and_lazily() {
        let mut first = keyword_rule(&["nomatch"], "A");
        first.required_roles = vec!["Member".to_string()];
        let mut second = keyword_rule(&["foo"], "B");
        second.excluded_roles = vec!["Staff".to_string()];
        let engine = engine(vec![keyword_rule(&["bar"], "plain"), first, second]);

        let roles = CountingRoles::new(StaticRoles::new().with_roles("u1", ["Member"]));
        let eval = run(&engine, &message("foo"), &roles).await;
        assert_eq!(eval.action.text(), Some("B"));
        assert_eq!(roles.calls(), 1);

        // No rule needs roles: no lookup at all
        let engine = engine_without_roles();
        let roles = CountingRoles::new(StaticRoles::new());
        let _ = run(&engine, &message("foo"), &roles).await;
        assert_eq!(roles.calls(), 0);
    }

    fn engine_without_roles() -> RuleEngine {
        engine(vec![keyword_rule(&["foo"], "A")])
    }

    #[tokio::test]
    async fn test_role_failure_degrades_to_empty_set() {
        let mut restricted = keyword_rule(&["foo"], "members only");
        restricted.required_roles = vec!["Member".to_string()];
        let mut excluded = keyword_rule(&["foo"], "everyone but staff");
        excluded.excluded_roles = vec!["Staff".to_string()];
        let engine = engine(vec![restricted, excluded]);

        let roles = CountingRoles::failing();
        let eval = run(&engine, &message("foo"), &roles).await;

        assert_eq!(eval.action.fired_rule(), Some(1));
        assert_eq!(roles.calls(), 1);
        assert!(matches!(eval.issues.as_slice(), [EvaluationIssue::Resolution(_)]));
    }

    #[tokio::test]
    async fn test_match_error_skips_only_that_rule() {
        let config = WardenConfig {
            backtrack_limit: 10,
            alert_rules: vec![
                AlertRuleConfig {
                    regex_patterns: vec![r"(a|b|ab)*(?=c)".to_string()],
                    warning_message: "pathological".to_string(),
                    ..Default::default()
                },
                keyword_rule(&["abababababababababababab"], "fallback"),
            ],
            ..Default::default()
        };
        let engine = RuleEngine::from_config(&config).unwrap();
        let roles = CountingRoles::new(StaticRoles::new());

        let eval = run(&engine, &message("ABABABABABABABABABABABAB"), &roles).await;
        assert_eq!(eval.action.text(), Some("fallback"));
        match eval.issues.as_slice() {
            [EvaluationIssue::Match(err)] => assert_eq!(err.rule_index, 0),
            other => panic!("expected one match issue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_rules_no_action() {
        let engine = engine(Vec::new());
        let roles = CountingRoles::new(StaticRoles::new());
        assert!(run(&engine, &message("anything"), &roles).await.action.is_no_action());
    }
}
