//! CLI command implementations

pub mod adjust;
pub mod complete;
pub mod content;
pub mod drift;
pub mod init;
pub mod progress;
pub mod state;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::Serialize;

use trailhead::config::Config;
use trailhead::progression::ProgressionEngine;

/// Global options shared by every command
pub struct Context {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    pub fn load_config(&self) -> Result<Config> {
        Config::load(self.config.as_deref())
    }

    /// Open the engine on `--db`, or on the configured database path
    pub fn engine(&self) -> Result<ProgressionEngine> {
        let config = self.load_config()?;
        let path = self.db.clone().unwrap_or_else(|| config.database_path());
        tracing::debug!("Using database {}", path.display());
        ProgressionEngine::open(&path, config)
            .with_context(|| format!("Failed to open engine at {}", path.display()))
    }

    /// Print `value` as pretty JSON if `--json` was given; returns whether it did
    pub fn emit_json<T: Serialize>(&self, value: &T) -> Result<bool> {
        if !self.json {
            return Ok(false);
        }
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(true)
    }
}
