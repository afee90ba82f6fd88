//! Progression engine: the operations callers use
//!
//! Coordinates the tracker, ledger and streak tracker inside one database
//! transaction per request, then hands notifications to the sink after the
//! commit.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::catalog::ContentTree;
use super::day_key::day_keys;
use super::db::EngineDb;
use super::ledger::{award_in, latest_event_id, XpLedger};
use super::levels::{title_for, LevelProgress};
use super::models::{
    AdjustResult, AwardResult, CompletionOutcome, GamificationSnapshot, LevelUp, ProgressView,
};
use super::projection::{level_change, load_state};
use super::reconcile::{DriftRun, ReconciliationChecker};
use super::roles::{AdminList, RoleProvider};
use super::streaks::{effective_streak, learner_timezone, record_activity_in, StreakTracker};
use super::tracker::{self, completed_nodes, ProgressTracker};
use super::unlock::{ensure_unlocked, UnlockGraph};
use crate::config::Config;
use crate::domain::{CompletionPayload, GamificationState, NodeId, NodeKind, ReasonCode};
use crate::error::EngineResult;
use crate::notify::{LogSink, Notification, NotificationSink, QueueStats, RetryQueue};

/// Entry point for all engine operations
///
/// Thread-safe through the internal mutex on the database connection.
/// Separate engines (or processes) on the same file coordinate through
/// SQLite's write lock.
#[derive(Clone)]
pub struct ProgressionEngine {
    db: EngineDb,
    config: Config,
    default_tz: Tz,
    tracker: ProgressTracker,
    ledger: XpLedger,
    streaks: StreakTracker,
    checker: ReconciliationChecker,
    sink: Arc<dyn NotificationSink>,
    queue: Arc<Mutex<RetryQueue<Notification>>>,
}

impl ProgressionEngine {
    /// Open the database at `path` with the configured admins and a logging sink
    pub fn open(path: &Path, config: Config) -> anyhow::Result<Self> {
        let db = EngineDb::open(path)?;
        let roles = Arc::new(AdminList::new(config.settings.admins.iter().cloned()));
        Self::with_collaborators(db, config, roles, Arc::new(LogSink))
    }

    pub fn with_collaborators(
        db: EngineDb,
        config: Config,
        roles: Arc<dyn RoleProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid engine configuration")?;
        let default_tz = config
            .settings
            .timezone()
            .with_context(|| format!("Unknown default_timezone: {}", config.settings.default_timezone))?;

        Ok(Self {
            tracker: ProgressTracker::new(db.clone()),
            ledger: XpLedger::new(db.clone(), config.rewards.clone(), default_tz, roles),
            streaks: StreakTracker::new(db.clone(), config.rewards.clone(), default_tz),
            checker: ReconciliationChecker::new(db.clone()),
            queue: Arc::new(Mutex::new(RetryQueue::new(config.queue.clone()))),
            sink,
            default_tz,
            config,
            db,
        })
    }

    pub fn db(&self) -> &EngineDb {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &XpLedger {
        &self.ledger
    }

    pub fn streaks(&self) -> &StreakTracker {
        &self.streaks
    }

    pub fn checker(&self) -> &ReconciliationChecker {
        &self.checker
    }

    // ========================================
    // CONTENT
    // ========================================

    /// Replace the authored node tree. Returns the number of nodes stored.
    pub fn import_catalog(&self, tree: &ContentTree) -> EngineResult<usize> {
        self.db.write(|conn| tree.store(conn))?;
        tracing::info!(nodes = tree.len(), zones = tree.zones().len(), "Imported content catalog");
        Ok(tree.len())
    }

    pub fn content(&self) -> EngineResult<ContentTree> {
        self.db.read(|conn| ContentTree::load(conn))
    }

    // ========================================
    // PROGRESS
    // ========================================

    /// Pure read: whether the learner may complete `node_id` now
    pub fn is_unlocked(&self, learner_id: &str, node_id: &str) -> EngineResult<bool> {
        self.db.read(|conn| {
            let tree = ContentTree::load(conn)?;
            let completed = completed_nodes(conn, learner_id)?;
            UnlockGraph::new(&tree, &completed).is_unlocked(node_id)
        })
    }

    /// Progress tree rooted at `scope` (usually a zone or chapter)
    pub fn get_progress(&self, learner_id: &str, scope: &str) -> EngineResult<ProgressView> {
        self.db.read(|conn| {
            let tree = ContentTree::load(conn)?;
            let completed = completed_nodes(conn, learner_id)?;
            let graph = UnlockGraph::new(&tree, &completed);
            tracker::progress_view(&tree, &completed, &graph, scope)
        })
    }

    pub fn record_completion(
        &self,
        learner_id: &str,
        node_id: &str,
        payload: Option<&CompletionPayload>,
    ) -> EngineResult<CompletionOutcome> {
        self.record_completion_at(learner_id, node_id, payload, None, Utc::now())
    }

    /// Record a completion and everything it earns, in one transaction:
    /// completion record and roll-ups, completion XP and bonuses, level, then
    /// the day's streak. `timezone` overrides the learner's stored zone.
    ///
    /// Safe to retry: a repeated call writes no new XP.
    pub fn record_completion_at(
        &self,
        learner_id: &str,
        node_id: &str,
        payload: Option<&CompletionPayload>,
        timezone: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<CompletionOutcome> {
        let now_ms = now.timestamp_millis();
        let rewards = &self.config.rewards;

        let (outcome, after, last_event) = self.db.write(|conn| {
            let tree = ContentTree::load(conn)?;
            let node = tree.require(node_id)?;
            // Unlocks can cascade through empty zones and prerequisite
            // chains anywhere in the tree, so the whole tree is compared
            let scope = tree.walk();

            let completed_before = completed_nodes(conn, learner_id)?;
            let unlocked_before: HashSet<NodeId> = {
                let graph = UnlockGraph::new(&tree, &completed_before);
                ensure_unlocked(&graph, learner_id, node_id)?;
                graph.unlocked_among(scope.iter().copied()).into_iter().collect()
            };

            let before = load_state(conn, learner_id)?;
            let tz = learner_timezone(&before, timezone, self.default_tz)?;
            let keys = day_keys(now, tz);
            // Multiplier uses the streak as it stands before today's activity
            let streak_at_award = effective_streak(&before, &keys);

            let completion = tracker::record_in(conn, &tree, learner_id, node_id, payload, now_ms)?;

            let mut awards: Vec<AwardResult> = Vec::new();
            let base = rewards.apply_multiplier(rewards.completion_for(node.kind), streak_at_award);
            awards.push(award_for_node(conn, learner_id, node_id, ReasonCode::Completion, base, now_ms)?);
            for rolled in &completion.rolled_up {
                let (reason, amount) = match rolled.kind {
                    NodeKind::Chapter => (ReasonCode::ChapterBonus, rewards.chapter_bonus),
                    NodeKind::Zone => (ReasonCode::ZoneBonus, rewards.zone_bonus),
                    NodeKind::Phase | NodeKind::Page => continue,
                };
                awards.push(award_for_node(conn, learner_id, &rolled.node_id, reason, amount, now_ms)?);
            }
            if payload.is_some_and(CompletionPayload::is_perfect) {
                awards.push(award_for_node(
                    conn,
                    learner_id,
                    node_id,
                    ReasonCode::PerfectScoreBonus,
                    rewards.perfect_score_bonus,
                    now_ms,
                )?);
            }

            let streak = record_activity_in(conn, rewards, learner_id, &keys, now_ms)?;

            let after = load_state(conn, learner_id)?;
            let completed_after = completed_nodes(conn, learner_id)?;
            let graph = UnlockGraph::new(&tree, &completed_after);
            let newly_unlocked: Vec<NodeId> = graph
                .unlocked_among(scope.iter().copied())
                .into_iter()
                .filter(|id| !unlocked_before.contains(id))
                .collect();

            let xp_awarded = awards.iter().chain(&streak.awards).map(|a| a.amount).sum();
            let level_up = level_change(before.level, after.level).filter(|c| c.new_level > c.old_level);
            let last_event = latest_event_id(conn, learner_id)?;

            Ok::<_, crate::error::EngineError>((
                CompletionOutcome {
                    completion,
                    awards,
                    xp_awarded,
                    total_xp: after.total_xp,
                    level: after.level,
                    level_up,
                    streak,
                    newly_unlocked,
                },
                after,
                last_event,
            ))
        })?;

        if outcome.is_duplicate() {
            tracing::debug!(learner_id, node_id, "Duplicate completion; nothing new credited");
        } else {
            tracing::info!(
                learner_id,
                node_id,
                xp_awarded = outcome.xp_awarded,
                total_xp = outcome.total_xp,
                level = outcome.level,
                streak = outcome.streak.current,
                "Recorded completion"
            );
        }

        self.notify(completion_notifications(learner_id, &outcome, &after, last_event));
        Ok(outcome)
    }

    // ========================================
    // GAMIFICATION STATE
    // ========================================

    pub fn get_gamification_state(&self, learner_id: &str) -> EngineResult<GamificationSnapshot> {
        self.get_gamification_state_at(learner_id, Utc::now())
    }

    /// Cached state as of `now`. A streak whose last day is older than
    /// yesterday is reported as 0.
    pub fn get_gamification_state_at(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<GamificationSnapshot> {
        let state = self.db.read(|conn| load_state(conn, learner_id))?;
        let tz = learner_timezone(&state, None, self.default_tz)?;
        let progress = LevelProgress::new(state.total_xp);
        Ok(GamificationSnapshot {
            learner_id: state.learner_id.clone(),
            total_xp: state.total_xp,
            level: state.level,
            title: title_for(state.level).to_string(),
            current_streak: effective_streak(&state, &day_keys(now, tz)),
            longest_streak: state.longest_streak,
            last_active_day: state.last_active_day.clone(),
            next_level_xp: progress.next_level_xp,
            progress_to_next: progress.progress_to_next(),
        })
    }

    pub fn set_timezone(&self, learner_id: &str, timezone: &str) -> EngineResult<()> {
        self.streaks.set_timezone(learner_id, timezone)
    }

    /// Admin-only signed adjustment; the level may go down
    pub fn adjust_xp(
        &self,
        learner_id: &str,
        delta: i64,
        reason: &str,
        actor_id: &str,
    ) -> EngineResult<AdjustResult> {
        let result = self.ledger.adjust(learner_id, delta, reason, actor_id)?;
        if result.level > result.old_level {
            self.notify(vec![Notification::LevelUp {
                learner_id: learner_id.to_string(),
                old_level: result.old_level,
                new_level: result.level,
                title: title_for(result.level).to_string(),
                event_id: result.event_id,
            }]);
        }
        Ok(result)
    }

    // ========================================
    // RECONCILIATION
    // ========================================

    /// Compare cached totals with the ledger for one learner, or all of them
    pub fn check_drift(&self, learner_id: Option<&str>) -> EngineResult<DriftRun> {
        self.checker.check(learner_id)
    }

    /// Operator repair from the ledger. Never invoked by the engine itself.
    pub fn rebuild_state(&self, learner_id: &str) -> EngineResult<(GamificationState, GamificationState)> {
        self.ledger.rebuild_state(learner_id)
    }

    // ========================================
    // NOTIFICATIONS
    // ========================================

    fn queue(&self) -> MutexGuard<'_, RetryQueue<Notification>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let now = Instant::now();
        {
            let mut queue = self.queue();
            for notification in notifications {
                let job_id = notification.job_id();
                if let Err(e) = queue.enqueue(job_id.clone(), notification, now) {
                    tracing::warn!(job_id = %job_id, error = %e, "Dropped notification");
                }
            }
        }
        self.dispatch_notifications();
    }

    /// Deliver every due notification. Returns how many were delivered.
    pub fn dispatch_notifications(&self) -> usize {
        let sink = Arc::clone(&self.sink);
        self.queue().process_due(Instant::now(), |n| sink.deliver(n))
    }

    pub fn pending_notifications(&self) -> usize {
        self.queue().depth()
    }

    pub fn notification_stats(&self) -> QueueStats {
        self.queue().stats()
    }
}

fn award_for_node(
    conn: &rusqlite::Connection,
    learner_id: &str,
    node_id: &str,
    reason: ReasonCode,
    amount: i64,
    now_ms: i64,
) -> EngineResult<AwardResult> {
    let key = reason.dedup_key(learner_id, node_id);
    award_in(conn, learner_id, Some(node_id), reason, &key, amount, now_ms)
}

fn completion_notifications(
    learner_id: &str,
    outcome: &CompletionOutcome,
    after: &GamificationState,
    last_event: i64,
) -> Vec<Notification> {
    let mut out = Vec::new();
    if let Some(LevelUp {
        old_level,
        new_level,
        new_title,
    }) = &outcome.level_up
    {
        out.push(Notification::LevelUp {
            learner_id: learner_id.to_string(),
            old_level: *old_level,
            new_level: *new_level,
            title: new_title.clone(),
            event_id: last_event,
        });
    }
    for node_id in &outcome.newly_unlocked {
        out.push(Notification::Unlocked {
            learner_id: learner_id.to_string(),
            node_id: node_id.clone(),
        });
    }
    if outcome.streak.milestone_bonus > 0 {
        out.push(Notification::Milestone {
            learner_id: learner_id.to_string(),
            days: outcome.streak.current,
            bonus: outcome.streak.milestone_bonus,
            streak_started_day: after.streak_started_day.clone().unwrap_or_default(),
        });
    }
    out
}
