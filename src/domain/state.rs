use serde::{Deserialize, Serialize};

use super::LearnerId;

/// Cached per-learner projection of the XP ledger and streak.
///
/// Written only by the ledger and the streak tracker; rebuildable from `xp_events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationState {
    pub learner_id: LearnerId,
    pub total_xp: i64,
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Local calendar day (YYYY-MM-DD) of the last credited activity
    pub last_active_day: Option<String>,
    /// Local day the current streak run started on
    pub streak_started_day: Option<String>,
    /// IANA timezone name, if the learner set one
    pub timezone: Option<String>,
    /// Level formula the cached `level` was computed with
    pub formula_version: String,
    pub updated_at: i64,
}

impl GamificationState {
    /// State of a learner that has never earned anything
    pub fn empty(learner_id: &str, formula_version: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            total_xp: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_active_day: None,
            streak_started_day: None,
            timezone: None,
            formula_version: formula_version.to_string(),
            updated_at: 0,
        }
    }
}
