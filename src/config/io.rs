//! Configuration file I/O operations

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::Config;

impl Config {
    /// Get the global config directory path (~/.trailhead/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trailhead")
    }

    /// Get the global config file path (~/.trailhead/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Database path from settings, or ~/.trailhead/progress.db
    pub fn database_path(&self) -> PathBuf {
        self.settings
            .database_path
            .clone()
            .unwrap_or_else(|| Self::global_config_dir().join("progress.db"))
    }

    /// Save configuration to a file with atomic write and file locking.
    ///
    /// Exclusive lock file guards concurrent writers; temp file + rename keeps
    /// the config intact if the process dies mid-write.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        let _lock = lock_config(path)?;
        write_atomic(path, &content)
        // Lock is released when _lock is dropped
    }

    /// Load configuration from `path`, or from ~/.trailhead/config.toml.
    ///
    /// The global file is created with defaults if it does not exist yet.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let global_path = Self::global_config_path();
        if !global_path.exists() {
            Self::auto_init(&global_path)?;
        }
        Self::from_file(&global_path)
    }

    /// Write a default config when none exists.
    ///
    /// Re-checks existence under the lock so concurrent first runs create it once.
    fn auto_init(config_path: &Path) -> Result<()> {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let _lock = lock_config(config_path)
            .with_context(|| "Failed to acquire config lock for auto-init")?;

        if config_path.exists() {
            return Ok(());
        }

        let content = toml::to_string_pretty(&Self::default())
            .with_context(|| "Failed to serialize default config")?;
        write_atomic(config_path, &content)?;

        tracing::info!("Created {}", config_path.display());
        Ok(())
    }
}

/// Take an exclusive lock on `<path>.lock`, held until the returned file drops
fn lock_config(path: &Path) -> Result<File> {
    let lock_path = path.with_extension("toml.lock");
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

    lock_file
        .lock_exclusive()
        .with_context(|| "Failed to acquire config lock")?;
    Ok(lock_file)
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("toml.tmp");
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

    temp_file
        .write_all(content.as_bytes())
        .with_context(|| "Failed to write config content")?;

    temp_file
        .sync_all()
        .with_context(|| "Failed to sync config file")?;

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename config file: {}", path.display()))?;
    Ok(())
}
