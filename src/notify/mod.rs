//! Notifications to learners
//!
//! The engine hands level-ups, unlocks and milestones to a
//! [`NotificationSink`] after its transaction commits. Delivery can fail or
//! be slow; the engine never waits on it. Failed deliveries go through a
//! bounded [`RetryQueue`].

mod queue;

pub use queue::{DeadLetter, QueueError, QueueStats, RetryQueue};

use serde::{Deserialize, Serialize};

/// Something a learner may want to hear about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    LevelUp {
        learner_id: String,
        old_level: u32,
        new_level: u32,
        title: String,
        /// Ledger row that completed the climb
        event_id: i64,
    },
    Unlocked {
        learner_id: String,
        node_id: String,
    },
    Milestone {
        learner_id: String,
        days: u32,
        bonus: i64,
        streak_started_day: String,
    },
}

impl Notification {
    /// Idempotent job id: the same event always maps to the same id
    pub fn job_id(&self) -> String {
        match self {
            Self::LevelUp {
                learner_id,
                new_level,
                event_id,
                ..
            } => format!("level-up:{learner_id}:{new_level}:{event_id}"),
            Self::Unlocked {
                learner_id,
                node_id,
            } => format!("unlocked:{learner_id}:{node_id}"),
            Self::Milestone {
                learner_id,
                days,
                streak_started_day,
                ..
            } => format!("milestone:{learner_id}:{days}:{streak_started_day}"),
        }
    }

    pub fn learner_id(&self) -> &str {
        match self {
            Self::LevelUp { learner_id, .. }
            | Self::Unlocked { learner_id, .. }
            | Self::Milestone { learner_id, .. } => learner_id,
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LevelUp {
                new_level, title, ..
            } => write!(f, "Reached level {new_level} ({title})"),
            Self::Unlocked { node_id, .. } => write!(f, "Unlocked {node_id}"),
            Self::Milestone { days, bonus, .. } => {
                write!(f, "{days}-day streak! +{bonus} XP")
            }
        }
    }
}

/// Delivery collaborator
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Sink that writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            learner_id = notification.learner_id(),
            job_id = %notification.job_id(),
            "{notification}"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_stable() {
        let a = Notification::Unlocked {
            learner_id: "l1".into(),
            node_id: "c2".into(),
        };
        assert_eq!(a.job_id(), "unlocked:l1:c2");
        assert_eq!(a.job_id(), a.clone().job_id());

        let m = Notification::Milestone {
            learner_id: "l1".into(),
            days: 7,
            bonus: 75,
            streak_started_day: "2024-05-01".into(),
        };
        assert_eq!(m.job_id(), "milestone:l1:7:2024-05-01");
        assert_eq!(m.to_string(), "7-day streak! +75 XP");
    }

    #[test]
    fn test_repeated_climbs_get_distinct_ids() {
        let climb = |event_id| Notification::LevelUp {
            learner_id: "l1".into(),
            old_level: 1,
            new_level: 2,
            title: "Novice".into(),
            event_id,
        };
        assert_eq!(climb(4).job_id(), "level-up:l1:2:4");
        assert_ne!(climb(4).job_id(), climb(9).job_id());
    }
}
