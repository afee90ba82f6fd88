//! Init command implementation

use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use trailhead::config::Config;

/// Write a default config file to `path` or ~/.trailhead/config.toml
pub async fn init_command(path: Option<&Path>, force: bool) -> Result<()> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::global_config_path);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    Config::default().save_to_file(&config_path)?;

    info!("Created {}", config_path.display());
    println!("Configuration written to {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Add admin actor ids to `admins` under [settings]");
    println!("  2. Set `default_timezone` to your learners' usual IANA zone");
    println!("  3. Import your content: trailhead content import catalog.toml");
    Ok(())
}
