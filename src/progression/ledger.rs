//! Append-only XP ledger
//!
//! Exactly-once crediting rests on the UNIQUE `dedup_key` column: inserts
//! use `ON CONFLICT DO NOTHING` and the affected-row count tells a fresh
//! award from a duplicate. The projection update runs in the same
//! transaction as the insert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;

use super::catalog::ContentTree;
use super::day_key::day_keys;
use super::db::EngineDb;
use super::levels::level_for;
use super::models::{AdjustResult, AwardResult};
use super::projection::{apply_xp, ensure_state, load_state};
use super::roles::RoleProvider;
use super::streaks::{effective_streak, learner_timezone};
use super::tracker::load_record;
use crate::config::Rewards;
use crate::domain::{GamificationState, NodeKind, ReasonCode, XpEvent};
use crate::error::{EngineError, EngineResult};

/// Awards, admin adjustments and ledger reads
#[derive(Clone)]
pub struct XpLedger {
    db: EngineDb,
    rewards: Rewards,
    default_tz: Tz,
    roles: Arc<dyn RoleProvider>,
}

impl XpLedger {
    pub fn new(db: EngineDb, rewards: Rewards, default_tz: Tz, roles: Arc<dyn RoleProvider>) -> Self {
        Self {
            db,
            rewards,
            default_tz,
            roles,
        }
    }

    /// Award the configured amount for a node-scoped reason.
    ///
    /// Returns `awarded: false` when the same award was already written.
    pub fn award(&self, learner_id: &str, node_id: &str, reason: ReasonCode) -> EngineResult<AwardResult> {
        self.award_at(learner_id, node_id, reason, Utc::now())
    }

    pub fn award_at(
        &self,
        learner_id: &str,
        node_id: &str,
        reason: ReasonCode,
        now: DateTime<Utc>,
    ) -> EngineResult<AwardResult> {
        self.db.write(|conn| {
            let tree = ContentTree::load(conn)?;
            let node = tree.require(node_id)?;
            let record = load_record(conn, learner_id, node_id)?.ok_or_else(|| {
                EngineError::Validation(format!("Node {node_id} is not completed by {learner_id}"))
            })?;

            let amount = match reason {
                ReasonCode::Completion => {
                    let state = load_state(conn, learner_id)?;
                    let tz = learner_timezone(&state, None, self.default_tz)?;
                    let streak = effective_streak(&state, &day_keys(now, tz));
                    self.rewards
                        .apply_multiplier(self.rewards.completion_for(node.kind), streak)
                }
                ReasonCode::ChapterBonus if node.kind == NodeKind::Chapter => self.rewards.chapter_bonus,
                ReasonCode::ZoneBonus if node.kind == NodeKind::Zone => self.rewards.zone_bonus,
                ReasonCode::PerfectScoreBonus
                    if record.payload.as_ref().is_some_and(|p| p.is_perfect()) =>
                {
                    self.rewards.perfect_score_bonus
                }
                other => {
                    return Err(EngineError::Validation(format!(
                        "{other} cannot be awarded for {} {node_id}",
                        node.kind
                    )));
                }
            };
            let key = reason.dedup_key(learner_id, node_id);
            award_in(conn, learner_id, Some(node_id), reason, &key, amount, now.timestamp_millis())
        })
    }

    /// Manual signed adjustment by an authorized actor. Always applied; no dedup key.
    pub fn adjust(
        &self,
        learner_id: &str,
        delta: i64,
        reason: &str,
        actor_id: &str,
    ) -> EngineResult<AdjustResult> {
        self.adjust_at(learner_id, delta, reason, actor_id, Utc::now())
    }

    pub fn adjust_at(
        &self,
        learner_id: &str,
        delta: i64,
        reason: &str,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<AdjustResult> {
        if !self.roles.can_adjust_xp(actor_id) {
            tracing::warn!(learner_id, actor_id, "Rejected XP adjustment from unauthorized actor");
            return Err(EngineError::Unauthorized(actor_id.to_string()));
        }
        if delta == 0 {
            return Err(EngineError::Validation("Adjustment delta must not be zero".into()));
        }
        if reason.trim().is_empty() {
            return Err(EngineError::Validation("Adjustment needs a reason".into()));
        }

        let now_ms = now.timestamp_millis();
        self.db.write(|conn| {
            ensure_state(conn, learner_id)?;
            let before = load_state(conn, learner_id)?;
            let new_total = before.total_xp.checked_add(delta).ok_or_else(|| {
                EngineError::Validation("Adjustment overflows the XP total".into())
            })?;
            if new_total < 0 {
                return Err(EngineError::Validation(format!(
                    "Adjustment of {delta} would take {learner_id} below zero XP (total {})",
                    before.total_xp
                )));
            }

            conn.execute(
                "INSERT INTO xp_events (learner_id, node_id, reason_code, amount, dedup_key, actor_id, note, created_at)
                 VALUES (?1, NULL, ?2, ?3, NULL, ?4, ?5, ?6)",
                (
                    learner_id,
                    ReasonCode::AdminAdjustment.as_str(),
                    delta,
                    actor_id,
                    reason.trim(),
                    now_ms,
                ),
            )?;
            let event_id = conn.last_insert_rowid();
            let (old_level, after) = apply_xp(conn, learner_id, delta, now_ms)?;

            tracing::info!(
                learner_id,
                actor_id,
                delta,
                total_xp = after.total_xp,
                level = after.level,
                "Applied admin XP adjustment"
            );
            Ok(AdjustResult {
                event_id,
                total_xp: after.total_xp,
                old_level,
                level: after.level,
            })
        })
    }

    /// Sum of all ledger rows for a learner
    pub fn ledger_total(&self, learner_id: &str) -> EngineResult<i64> {
        self.db.read(|conn| ledger_total(conn, learner_id))
    }

    /// Ledger rows for a learner, oldest first
    pub fn events(&self, learner_id: &str) -> EngineResult<Vec<XpEvent>> {
        self.db.read(|conn| events(conn, learner_id))
    }

    /// Operator repair: recompute `total_xp` and `level` from the ledger.
    ///
    /// Never called automatically. Returns the state before and after.
    pub fn rebuild_state(&self, learner_id: &str) -> EngineResult<(GamificationState, GamificationState)> {
        let now_ms = Utc::now().timestamp_millis();
        self.db.write(|conn| {
            ensure_state(conn, learner_id)?;
            let before = load_state(conn, learner_id)?;
            let total = ledger_total(conn, learner_id)?;
            let level = level_for(total);
            conn.execute(
                "UPDATE gamification_state
                 SET total_xp = ?1, level = ?2, formula_version = ?3, updated_at = ?4
                 WHERE learner_id = ?5",
                (total, level, super::levels::FORMULA_VERSION, now_ms, learner_id),
            )?;
            let after = load_state(conn, learner_id)?;
            tracing::warn!(
                learner_id,
                cached_total = before.total_xp,
                ledger_total = total,
                old_level = before.level,
                level,
                "Rebuilt gamification state from ledger"
            );
            Ok((before, after))
        })
    }
}

/// Insert one dedup-keyed event and apply it to the projection.
///
/// The insert is the only idempotency check: a conflicting key leaves the
/// ledger and the projection untouched.
pub(crate) fn award_in(
    conn: &Connection,
    learner_id: &str,
    node_id: Option<&str>,
    reason: ReasonCode,
    dedup_key: &str,
    amount: i64,
    now_ms: i64,
) -> EngineResult<AwardResult> {
    let inserted = conn.execute(
        "INSERT INTO xp_events (learner_id, node_id, reason_code, amount, dedup_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(dedup_key) DO NOTHING",
        (learner_id, node_id, reason.as_str(), amount, dedup_key, now_ms),
    )?;
    if inserted == 0 {
        tracing::debug!(learner_id, dedup_key, "Duplicate award ignored");
        return Ok(AwardResult::duplicate(reason, node_id));
    }

    let (_, after) = apply_xp(conn, learner_id, amount, now_ms)?;
    tracing::info!(
        learner_id,
        reason = %reason,
        amount,
        total_xp = after.total_xp,
        "Awarded XP"
    );
    Ok(AwardResult {
        reason,
        node_id: node_id.map(str::to_string),
        awarded: true,
        amount,
    })
}

/// Id of the learner's newest ledger row (0 if none)
pub(crate) fn latest_event_id(conn: &Connection, learner_id: &str) -> EngineResult<i64> {
    let id = conn.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM xp_events WHERE learner_id = ?1",
        [learner_id],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub(crate) fn ledger_total(conn: &Connection, learner_id: &str) -> EngineResult<i64> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM xp_events WHERE learner_id = ?1",
        [learner_id],
        |r| r.get(0),
    )?;
    Ok(total)
}

pub(crate) fn events(conn: &Connection, learner_id: &str) -> EngineResult<Vec<XpEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, node_id, reason_code, amount, dedup_key, actor_id, note, created_at
         FROM xp_events WHERE learner_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([learner_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, Option<String>>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, i64>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, Option<String>>(5)?,
            r.get::<_, Option<String>>(6)?,
            r.get::<_, i64>(7)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, node_id, reason, amount, dedup_key, actor_id, note, created_at) = row?;
        let reason = ReasonCode::from_str(&reason).ok_or_else(|| {
            EngineError::Validation(format!("Ledger row {id} has unknown reason {reason}"))
        })?;
        out.push(XpEvent {
            id,
            learner_id: learner_id.to_string(),
            node_id,
            reason,
            amount,
            dedup_key,
            actor_id,
            note,
            created_at,
        });
    }
    Ok(out)
}
