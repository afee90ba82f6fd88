//! The `gamification_state` projection
//!
//! Only the ledger and the streak tracker write here, always inside the same
//! transaction as the ledger rows they reflect.

use rusqlite::{Connection, OptionalExtension};

use super::levels::{level_for, FORMULA_VERSION};
use super::models::LevelUp;
use crate::domain::GamificationState;
use crate::error::EngineResult;

/// Load a learner's state; learners with no row yet get the empty state
pub(crate) fn load_state(conn: &Connection, learner_id: &str) -> EngineResult<GamificationState> {
    let state = conn
        .query_row(
            "SELECT total_xp, level, current_streak, longest_streak, last_active_day,
                    streak_started_day, timezone, formula_version, updated_at
             FROM gamification_state WHERE learner_id = ?1",
            [learner_id],
            |r| {
                Ok(GamificationState {
                    learner_id: learner_id.to_string(),
                    total_xp: r.get(0)?,
                    level: r.get(1)?,
                    current_streak: r.get(2)?,
                    longest_streak: r.get(3)?,
                    last_active_day: r.get(4)?,
                    streak_started_day: r.get(5)?,
                    timezone: r.get(6)?,
                    formula_version: r.get(7)?,
                    updated_at: r.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(state.unwrap_or_else(|| GamificationState::empty(learner_id, FORMULA_VERSION)))
}

/// Create the learner's row if missing
pub(crate) fn ensure_state(conn: &Connection, learner_id: &str) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO gamification_state (learner_id, formula_version) VALUES (?1, ?2)
         ON CONFLICT(learner_id) DO NOTHING",
        (learner_id, FORMULA_VERSION),
    )?;
    Ok(())
}

/// Add `amount` to the cached total and re-derive the level.
///
/// Must run in the transaction that inserted the matching ledger row. The
/// stored `formula_version` is left alone: a row written under another
/// formula stays visible to reconciliation until `rebuild_state` runs.
pub(crate) fn apply_xp(
    conn: &Connection,
    learner_id: &str,
    amount: i64,
    now_ms: i64,
) -> EngineResult<(u32, GamificationState)> {
    ensure_state(conn, learner_id)?;
    let before = load_state(conn, learner_id)?;

    let expected = level_for(before.total_xp);
    if before.level != expected || before.formula_version != FORMULA_VERSION {
        tracing::warn!(
            learner_id,
            cached_level = before.level,
            expected_level = expected,
            formula_version = %before.formula_version,
            "Cached level disagrees with the level formula; leaving it for reconciliation"
        );
    }

    let new_total = before.total_xp + amount;
    let new_level = level_for(new_total);
    conn.execute(
        "UPDATE gamification_state
         SET total_xp = ?1, level = ?2, updated_at = ?3
         WHERE learner_id = ?4",
        (new_total, new_level, now_ms, learner_id),
    )?;

    let after = GamificationState {
        total_xp: new_total,
        level: new_level,
        updated_at: now_ms,
        ..before.clone()
    };
    Ok((before.level, after))
}

/// Level change between two levels, if any
pub(crate) fn level_change(old_level: u32, new_level: u32) -> Option<LevelUp> {
    (new_level != old_level).then(|| LevelUp {
        old_level,
        new_level,
        new_title: super::levels::title_for(new_level).to_string(),
    })
}
