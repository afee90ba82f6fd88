//! XP reward tables

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::domain::NodeKind;

/// Base completion XP per node kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRewards {
    #[serde(default = "default_page_xp")]
    pub page: i64,
    #[serde(default = "default_phase_xp")]
    pub phase: i64,
    #[serde(default = "default_chapter_xp")]
    pub chapter: i64,
    #[serde(default = "default_zone_xp")]
    pub zone: i64,
}

fn default_page_xp() -> i64 {
    10
}

fn default_phase_xp() -> i64 {
    20
}

fn default_chapter_xp() -> i64 {
    40
}

fn default_zone_xp() -> i64 {
    80
}

impl Default for CompletionRewards {
    fn default() -> Self {
        Self {
            page: default_page_xp(),
            phase: default_phase_xp(),
            chapter: default_chapter_xp(),
            zone: default_zone_xp(),
        }
    }
}

/// Fixed bonus for reaching a streak length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneReward {
    pub days: u32,
    pub bonus: i64,
}

/// Completion multiplier applied from `min_streak` days upward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierTier {
    pub min_streak: u32,
    /// 100 = no change
    pub percent: u32,
}

/// XP amounts and streak rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rewards {
    #[serde(default)]
    pub completion: CompletionRewards,

    #[serde(default = "default_chapter_bonus")]
    pub chapter_bonus: i64,

    #[serde(default = "default_zone_bonus")]
    pub zone_bonus: i64,

    #[serde(default = "default_perfect_score_bonus")]
    pub perfect_score_bonus: i64,

    /// XP per streak day for the daily streak-continued award
    #[serde(default = "default_streak_step")]
    pub streak_continued_step: i64,

    /// Cap on the daily streak-continued award
    #[serde(default = "default_streak_cap")]
    pub streak_continued_cap: i64,

    #[serde(default = "default_milestones")]
    pub milestones: Vec<MilestoneReward>,

    #[serde(default = "default_multiplier_tiers")]
    pub multiplier_tiers: Vec<MultiplierTier>,
}

fn default_chapter_bonus() -> i64 {
    50
}

fn default_zone_bonus() -> i64 {
    200
}

fn default_perfect_score_bonus() -> i64 {
    15
}

fn default_streak_step() -> i64 {
    2
}

fn default_streak_cap() -> i64 {
    20
}

fn default_milestones() -> Vec<MilestoneReward> {
    vec![
        MilestoneReward { days: 3, bonus: 25 },
        MilestoneReward { days: 7, bonus: 75 },
        MilestoneReward { days: 30, bonus: 300 },
        MilestoneReward { days: 100, bonus: 1000 },
    ]
}

fn default_multiplier_tiers() -> Vec<MultiplierTier> {
    vec![
        MultiplierTier { min_streak: 3, percent: 125 },
        MultiplierTier { min_streak: 7, percent: 150 },
        MultiplierTier { min_streak: 30, percent: 200 },
    ]
}

impl Default for Rewards {
    fn default() -> Self {
        Self {
            completion: CompletionRewards::default(),
            chapter_bonus: default_chapter_bonus(),
            zone_bonus: default_zone_bonus(),
            perfect_score_bonus: default_perfect_score_bonus(),
            streak_continued_step: default_streak_step(),
            streak_continued_cap: default_streak_cap(),
            milestones: default_milestones(),
            multiplier_tiers: default_multiplier_tiers(),
        }
    }
}

impl Rewards {
    /// Base completion XP for a node kind (before the streak multiplier)
    pub fn completion_for(&self, kind: NodeKind) -> i64 {
        match kind {
            NodeKind::Page => self.completion.page,
            NodeKind::Phase => self.completion.phase,
            NodeKind::Chapter => self.completion.chapter,
            NodeKind::Zone => self.completion.zone,
        }
    }

    /// Multiplier percent for a streak length; tiers must be sorted ascending
    pub fn multiplier_percent(&self, streak: u32) -> u32 {
        self.multiplier_tiers
            .iter()
            .rev()
            .find(|t| streak >= t.min_streak)
            .map(|t| t.percent)
            .unwrap_or(100)
    }

    /// Scale a completion amount by the streak multiplier (rounds down)
    pub fn apply_multiplier(&self, base: i64, streak: u32) -> i64 {
        base * i64::from(self.multiplier_percent(streak)) / 100
    }

    /// Daily streak-continued XP: day 1 = step, day 2 = 2 x step, ... capped
    pub fn streak_continued(&self, streak: u32) -> i64 {
        (i64::from(streak) * self.streak_continued_step).min(self.streak_continued_cap)
    }

    /// Bonus for exactly reaching `streak` days, if it is a milestone
    pub fn milestone_bonus(&self, streak: u32) -> Option<i64> {
        self.milestones
            .iter()
            .find(|m| m.days == streak)
            .map(|m| m.bonus)
    }

    pub fn validate(&self) -> Result<()> {
        let amounts = [
            ("completion.page", self.completion.page),
            ("completion.phase", self.completion.phase),
            ("completion.chapter", self.completion.chapter),
            ("completion.zone", self.completion.zone),
            ("chapter_bonus", self.chapter_bonus),
            ("zone_bonus", self.zone_bonus),
            ("perfect_score_bonus", self.perfect_score_bonus),
            ("streak_continued_step", self.streak_continued_step),
            ("streak_continued_cap", self.streak_continued_cap),
        ];
        for (name, value) in amounts {
            if value < 0 {
                bail!("rewards.{name} must not be negative");
            }
        }

        for pair in self.milestones.windows(2) {
            if pair[1].days <= pair[0].days {
                bail!("rewards.milestones must be sorted by strictly increasing days");
            }
        }
        if self.milestones.iter().any(|m| m.days == 0 || m.bonus < 0) {
            bail!("rewards.milestones need days >= 1 and a non-negative bonus");
        }

        let mut previous = MultiplierTier { min_streak: 0, percent: 100 };
        for tier in &self.multiplier_tiers {
            if tier.min_streak <= previous.min_streak || tier.percent <= previous.percent {
                bail!("rewards.multiplier_tiers must increase in both min_streak and percent");
            }
            previous = *tier;
        }
        Ok(())
    }
}
