use serde::{Deserialize, Serialize};

use super::{LearnerId, NodeId};

/// Why an XP event was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    Completion,
    ChapterBonus,
    ZoneBonus,
    PerfectScoreBonus,
    StreakMilestone,
    StreakContinued,
    AdminAdjustment,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::ChapterBonus => "chapter-bonus",
            Self::ZoneBonus => "zone-bonus",
            Self::PerfectScoreBonus => "perfect-score-bonus",
            Self::StreakMilestone => "streak-milestone",
            Self::StreakContinued => "streak-continued",
            Self::AdminAdjustment => "admin-adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completion" => Some(Self::Completion),
            "chapter-bonus" => Some(Self::ChapterBonus),
            "zone-bonus" => Some(Self::ZoneBonus),
            "perfect-score-bonus" => Some(Self::PerfectScoreBonus),
            "streak-milestone" => Some(Self::StreakMilestone),
            "streak-continued" => Some(Self::StreakContinued),
            "admin-adjustment" => Some(Self::AdminAdjustment),
            _ => None,
        }
    }

    /// Dedup key for a node-scoped award
    pub fn dedup_key(&self, learner_id: &str, node_id: &str) -> String {
        format!("{learner_id}:{node_id}:{}", self.as_str())
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpEvent {
    pub id: i64,
    pub learner_id: LearnerId,
    pub node_id: Option<NodeId>,
    pub reason: ReasonCode,
    pub amount: i64,
    /// None only for admin adjustments
    pub dedup_key: Option<String>,
    pub actor_id: Option<String>,
    pub note: Option<String>,
    /// ms since epoch
    pub created_at: i64,
}
