//! Daily streak tracking
//!
//! Tracks consecutive local calendar days with activity. The day boundary is
//! the learner's own midnight, so every transition works on day keys from
//! [`super::day_key`].

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;

use super::day_key::{day_keys, parse_timezone, DayKeys};
use super::db::EngineDb;
use super::ledger::award_in;
use super::models::{AwardResult, StreakResult};
use super::projection::{ensure_state, load_state};
use crate::config::Rewards;
use crate::domain::{GamificationState, ReasonCode};
use crate::error::EngineResult;

/// Timezone for a learner: explicit override, then the stored zone, then the default
pub(crate) fn learner_timezone(
    state: &GamificationState,
    override_tz: Option<&str>,
    default_tz: Tz,
) -> EngineResult<Tz> {
    match override_tz.or(state.timezone.as_deref()) {
        Some(name) => parse_timezone(name),
        None => Ok(default_tz),
    }
}

/// Streak that still counts right now: the stored value if the learner was
/// active today or yesterday, otherwise 0
pub fn effective_streak(state: &GamificationState, keys: &DayKeys) -> u32 {
    match state.last_active_day.as_deref() {
        Some(day) if day == keys.today || day == keys.yesterday => state.current_streak,
        _ => 0,
    }
}

/// Dedup key for the once-per-day streak-continued award
fn continued_key(learner_id: &str, day: &str) -> String {
    format!("{learner_id}:day:{day}:{}", ReasonCode::StreakContinued.as_str())
}

/// Dedup key for a milestone within one streak run
fn milestone_key(learner_id: &str, days: u32, started: &str) -> String {
    format!("{learner_id}:{}:{days}:{started}", ReasonCode::StreakMilestone.as_str())
}

/// Records daily activity and streak awards
#[derive(Clone)]
pub struct StreakTracker {
    db: EngineDb,
    rewards: Rewards,
    default_tz: Tz,
}

impl StreakTracker {
    pub fn new(db: EngineDb, rewards: Rewards, default_tz: Tz) -> Self {
        Self {
            db,
            rewards,
            default_tz,
        }
    }

    /// Record activity now. `timezone` overrides the learner's stored zone for this call.
    pub fn record_activity(&self, learner_id: &str, timezone: Option<&str>) -> EngineResult<StreakResult> {
        self.record_activity_at(learner_id, timezone, Utc::now())
    }

    pub fn record_activity_at(
        &self,
        learner_id: &str,
        timezone: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<StreakResult> {
        self.db.write(|conn| {
            let state = load_state(conn, learner_id)?;
            let tz = learner_timezone(&state, timezone, self.default_tz)?;
            record_activity_in(conn, &self.rewards, learner_id, &day_keys(now, tz), now.timestamp_millis())
        })
    }

    /// Store the learner's IANA timezone
    pub fn set_timezone(&self, learner_id: &str, timezone: &str) -> EngineResult<()> {
        let tz = parse_timezone(timezone)?;
        self.db.write(|conn| {
            ensure_state(conn, learner_id)?;
            conn.execute(
                "UPDATE gamification_state SET timezone = ?1 WHERE learner_id = ?2",
                (tz.name(), learner_id),
            )?;
            tracing::info!(learner_id, timezone = tz.name(), "Set learner timezone");
            Ok(())
        })
    }
}

/// Apply today's activity to the streak and write its awards.
///
/// The streak row is updated with a compare-and-set on `last_active_day`,
/// so two writers that both saw yesterday's state cannot both extend it.
pub(crate) fn record_activity_in(
    conn: &Connection,
    rewards: &Rewards,
    learner_id: &str,
    keys: &DayKeys,
    now_ms: i64,
) -> EngineResult<StreakResult> {
    ensure_state(conn, learner_id)?;
    let state = load_state(conn, learner_id)?;

    if state.last_active_day.as_deref() == Some(keys.today.as_str()) {
        tracing::debug!(learner_id, day = %keys.today, "Activity already credited today");
        return Ok(unchanged(&state));
    }

    let continues = state.last_active_day.as_deref() == Some(keys.yesterday.as_str());
    let (current, started) = if continues {
        let started = state
            .streak_started_day
            .clone()
            .unwrap_or_else(|| keys.yesterday.clone());
        (state.current_streak.saturating_add(1), started)
    } else {
        (1, keys.today.clone())
    };
    let longest = state.longest_streak.max(current);

    let swapped = conn.execute(
        "UPDATE gamification_state
         SET current_streak = ?1, longest_streak = ?2, last_active_day = ?3,
             streak_started_day = ?4, updated_at = ?5
         WHERE learner_id = ?6 AND last_active_day IS ?7",
        (
            current,
            longest,
            &keys.today,
            &started,
            now_ms,
            learner_id,
            state.last_active_day.as_deref(),
        ),
    )?;
    if swapped == 0 {
        // Another writer moved last_active_day first; its update stands
        tracing::debug!(learner_id, "Streak compare-and-set lost");
        return Ok(unchanged(&load_state(conn, learner_id)?));
    }

    let mut awards: Vec<AwardResult> = Vec::new();
    let mut continued_bonus = 0;
    if current >= 2 {
        let amount = rewards.streak_continued(current);
        let award = award_in(
            conn,
            learner_id,
            None,
            ReasonCode::StreakContinued,
            &continued_key(learner_id, &keys.today),
            amount,
            now_ms,
        )?;
        continued_bonus = award.amount;
        awards.push(award);
    }

    let mut milestone_bonus = 0;
    if let Some(bonus) = rewards.milestone_bonus(current) {
        let award = award_in(
            conn,
            learner_id,
            None,
            ReasonCode::StreakMilestone,
            &milestone_key(learner_id, current, &started),
            bonus,
            now_ms,
        )?;
        if award.awarded {
            tracing::info!(learner_id, days = current, bonus, "Streak milestone reached");
        }
        milestone_bonus = award.amount;
        awards.push(award);
    }

    tracing::debug!(learner_id, current, longest, day = %keys.today, "Streak updated");
    Ok(StreakResult {
        current,
        longest,
        extended: true,
        milestone_bonus,
        continued_bonus,
        awards,
    })
}

fn unchanged(state: &GamificationState) -> StreakResult {
    StreakResult {
        current: state.current_streak,
        longest: state.longest_streak,
        extended: false,
        milestone_bonus: 0,
        continued_bonus: 0,
        awards: Vec::new(),
    }
}
