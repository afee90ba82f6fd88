//! Result and view types returned by engine operations

use serde::{Deserialize, Serialize};

use crate::domain::{CompletionPayload, LearnerId, NodeId, NodeKind, ReasonCode};

/// Stored completion of one node by one learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub learner_id: LearnerId,
    pub node_id: NodeId,
    /// ms since epoch of the first completion
    pub first_completed_at: i64,
    /// ms since epoch of the most recent submission
    pub completed_at: i64,
    pub payload: Option<CompletionPayload>,
}

/// Outcome of recording a completion, before any XP is computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub learner_id: LearnerId,
    pub node_id: NodeId,
    /// False for a re-submission of an already completed node
    pub first_completion: bool,
    pub completed_at: i64,
    /// Ancestors that became complete because this was their last open child
    pub rolled_up: Vec<RolledUpNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolledUpNode {
    pub node_id: NodeId,
    pub kind: NodeKind,
}

/// Outcome of one award attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardResult {
    pub reason: ReasonCode,
    pub node_id: Option<NodeId>,
    /// False when the dedup key already existed (retry or duplicate submission)
    pub awarded: bool,
    /// 0 when not awarded
    pub amount: i64,
}

impl AwardResult {
    pub(crate) fn duplicate(reason: ReasonCode, node_id: Option<&str>) -> Self {
        Self {
            reason,
            node_id: node_id.map(str::to_string),
            awarded: false,
            amount: 0,
        }
    }
}

/// A level change caused by an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
    pub new_title: String,
}

/// Outcome of recording a day of activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakResult {
    pub current: u32,
    pub longest: u32,
    /// False when today was already credited
    pub extended: bool,
    /// Milestone XP written by this call (0 if none)
    pub milestone_bonus: i64,
    /// Daily streak-continued XP written by this call (0 if none)
    pub continued_bonus: i64,
    pub awards: Vec<AwardResult>,
}

/// Full outcome of a completion submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub completion: CompletionResult,
    /// Every award attempted, including duplicate no-ops
    pub awards: Vec<AwardResult>,
    /// Sum of XP actually written by this call
    pub xp_awarded: i64,
    pub total_xp: i64,
    pub level: u32,
    pub level_up: Option<LevelUp>,
    pub streak: StreakResult,
    pub newly_unlocked: Vec<NodeId>,
}

impl CompletionOutcome {
    /// True when nothing new was credited (safe to skip "you earned XP" notices)
    pub fn is_duplicate(&self) -> bool {
        self.xp_awarded == 0 && !self.completion.first_completion
    }
}

/// One node in a progress tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressView {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub title: String,
    pub completed: bool,
    pub unlocked: bool,
    /// 0..=100, rounded down
    pub percentage: u8,
    pub children: Vec<ProgressView>,
}

/// Read-side view of a learner's gamification state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamificationSnapshot {
    pub learner_id: LearnerId,
    pub total_xp: i64,
    pub level: u32,
    pub title: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_day: Option<String>,
    pub next_level_xp: i64,
    pub progress_to_next: f32,
}

/// Outcome of an admin XP adjustment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustResult {
    pub event_id: i64,
    pub total_xp: i64,
    pub old_level: u32,
    pub level: u32,
}

/// Comparison of the cached total against the ledger for one learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub learner_id: LearnerId,
    pub cached_total: i64,
    pub ledger_total: i64,
    /// cached_total - ledger_total
    pub delta: i64,
    pub cached_level: u32,
    pub expected_level: u32,
    pub formula_version: String,
    pub drifted: bool,
}
