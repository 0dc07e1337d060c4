// Pattern compiler: turns rule keywords or regex patterns into matchers.

use std::collections::HashSet;

use fancy_regex::{Regex, RegexBuilder};

use super::model::AlertRuleConfig;
use crate::core::error::{ConfigError, MatchError};

/// fancy_regex's own default.
pub const DEFAULT_BACKTRACK_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherOptions {
    pub backtrack_limit: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            backtrack_limit: DEFAULT_BACKTRACK_LIMIT,
        }
    }
}

/// A case-insensitive matcher, immutable once built.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
}

impl CompiledPattern {
    fn build(pattern: &str, options: MatcherOptions) -> Result<Self, fancy_regex::Error> {
        // A leading (?i) still lets the pattern switch case sensitivity back on inline.
        let regex = RegexBuilder::new(&format!("(?i){pattern}"))
            .backtrack_limit(options.backtrack_limit)
            .build()?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, content: &str) -> Result<bool, fancy_regex::Error> {
        self.regex.is_match(content)
    }
}

/// Single whole-word alternation over every keyword.
pub fn keyword_pattern(keywords: &[String]) -> String {
    format!(r"\b({})\b", keywords.join("|"))
}

/// A rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub index: usize,
    pub warning_message: String,
    pub external_link_required: bool,
    pub required_roles: HashSet<String>,
    pub excluded_roles: HashSet<String>,
    pub omit_members_older_than_days: Option<i64>,
    pub matchers: Vec<CompiledPattern>,
}

impl CompiledRule {
    /// No warning text or nothing to match against.
    pub fn is_inert(&self) -> bool {
        self.warning_message.is_empty() || self.matchers.is_empty()
    }

    pub fn needs_roles(&self) -> bool {
        !self.required_roles.is_empty() || !self.excluded_roles.is_empty()
    }

    /// Index of the first matcher that hits `lowered`, if any.
    pub fn first_match(&self, lowered: &str) -> Result<Option<usize>, MatchError> {
        for (pattern_index, matcher) in self.matchers.iter().enumerate() {
            let hit = matcher.is_match(lowered).map_err(|source| MatchError {
                rule_index: self.index,
                pattern_index,
                source,
            })?;
            if hit {
                return Ok(Some(pattern_index));
            }
        }
        Ok(None)
    }
}

/// Compile one rule. The config is normalized first.
pub fn compile_rule(
    index: usize,
    config: &AlertRuleConfig,
    options: MatcherOptions,
) -> Result<CompiledRule, ConfigError> {
    let mut config = config.clone();
    config.normalize();

    let sources: Vec<String> = if !config.regex_patterns.is_empty() {
        config.regex_patterns.clone()
    } else if !config.keywords.is_empty() {
        vec![keyword_pattern(&config.keywords)]
    } else {
        Vec::new()
    };

    let mut matchers = Vec::with_capacity(sources.len());
    for (pattern_index, pattern) in sources.into_iter().enumerate() {
        let matcher =
            CompiledPattern::build(&pattern, options).map_err(|source| ConfigError::InvalidPattern {
                rule_index: index,
                pattern_index,
                pattern: pattern.clone(),
                source,
            })?;
        matchers.push(matcher);
    }

    Ok(CompiledRule {
        index,
        warning_message: config.warning_message,
        external_link_required: config.external_link_required,
        required_roles: config.required_roles.into_iter().collect(),
        excluded_roles: config.excluded_roles.into_iter().collect(),
        omit_members_older_than_days: config.omit_members_older_than_days,
        matchers,
    })
}

/// Compile every rule in order. The first bad pattern aborts.
pub fn compile_rules(
    configs: &[AlertRuleConfig],
    options: MatcherOptions,
) -> Result<Vec<CompiledRule>, ConfigError> {
    configs
        .iter()
        .enumerate()
        .map(|(index, config)| compile_rule(index, config, options))
        .collect()
}
