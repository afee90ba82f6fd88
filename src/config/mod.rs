//! Configuration loading and management

mod io;
mod queue;
mod rewards;
mod settings;

pub use queue::QueueSettings;
pub use rewards::{CompletionRewards, MilestoneReward, MultiplierTier, Rewards};
pub use settings::Settings;

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// XP amounts, streak milestones and multiplier tiers
    #[serde(default)]
    pub rewards: Rewards,

    /// Notification retry queue
    #[serde(default)]
    pub queue: QueueSettings,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.settings.timezone().is_none() {
            bail!("Unknown default_timezone: {}", self.settings.default_timezone);
        }
        self.rewards.validate()?;
        if self.queue.capacity == 0 {
            bail!("queue.capacity must be at least 1");
        }
        if self.queue.base_backoff_ms > self.queue.max_backoff_ms {
            bail!("queue.base_backoff_ms must not exceed queue.max_backoff_ms");
        }
        Ok(())
    }
}
