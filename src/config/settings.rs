//! General settings

use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Database location (defaults to ~/.trailhead/progress.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// IANA timezone used for learners that have not set their own
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Actor ids allowed to make manual XP adjustments
    #[serde(default)]
    pub admins: Vec<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            default_timezone: default_timezone(),
            admins: Vec::new(),
        }
    }
}

impl Settings {
    /// Parsed default timezone (None if the name is not a known IANA zone)
    pub fn timezone(&self) -> Option<Tz> {
        self.default_timezone.parse::<Tz>().ok()
    }
}
