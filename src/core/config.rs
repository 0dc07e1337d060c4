use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::alerts::matcher::DEFAULT_BACKTRACK_LIMIT;
use super::alerts::model::{AlertRuleConfig, LinkPolicy};
use super::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";
pub const DEFAULT_EMBED_COLOR: u32 = 0xff0000;

/// Warden configuration, read once at startup.
///
/// Unknown fields are rejected so that documents in the old
/// `keyword_lists` layout fail loudly instead of loading zero rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WardenConfig {
    /// DM sent to new members; empty disables it
    #[serde(default)]
    pub join_warning_message: String,
    #[serde(default)]
    pub link_policy: LinkPolicy,
    #[serde(default = "default_backtrack_limit")]
    pub backtrack_limit: usize,
    /// Colour of the warning embed (0xRRGGBB)
    #[serde(default = "default_embed_color")]
    pub embed_color: u32,
    /// Ordered; the first rule that fires wins
    #[serde(default)]
    pub alert_rules: Vec<AlertRuleConfig>,
}

fn default_backtrack_limit() -> usize {
    DEFAULT_BACKTRACK_LIMIT
}

fn default_embed_color() -> u32 {
    DEFAULT_EMBED_COLOR
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            join_warning_message: String::new(),
            link_policy: LinkPolicy::default(),
            backtrack_limit: DEFAULT_BACKTRACK_LIMIT,
            embed_color: DEFAULT_EMBED_COLOR,
            alert_rules: Vec::new(),
        }
    }
}

impl WardenConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    pub fn normalize(&mut self) {
        for rule in &mut self.alert_rules {
            rule.normalize();
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Missing or malformed config is an error, never a silent default.
    pub fn load(&self) -> Result<WardenConfig, ConfigError> {
        let content = fs::read_to_string(&self.config_path).map_err(|source| ConfigError::Read {
            path: self.config_path.clone(),
            source,
        })?;
        WardenConfig::from_json(&content)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}
