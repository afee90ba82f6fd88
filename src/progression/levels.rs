//! XP and Level system
//!
//! The single place levels are computed. Thresholds follow one canonical
//! formula, identified by [`FORMULA_VERSION`]:
//!
//! ```text
//! threshold_for(L) = 50 * L * (L - 1)      L >= 1
//! level_for(xp)    = max { L : threshold_for(L) <= xp }
//! ```
//!
//! Level 1 starts at 0 XP, level 2 at 100, level 3 at 300, level 4 at 600.

use serde::{Deserialize, Serialize};

/// Identifier stored next to every cached level
pub const FORMULA_VERSION: &str = "triangular-50/v1";

const STEP: i64 = 50;

/// Display titles by first level of each band (must be sorted by level)
pub static TITLES: &[(u32, &str)] = &[
    (1, "Apprentice"),
    (2, "Novice"),
    (4, "Scholar"),
    (7, "Adept"),
    (10, "Expert"),
    (15, "Master"),
    (20, "Sage"),
    (30, "Luminary"),
];

/// Minimum total XP for `level`. Levels start at 1; 0 is treated as 1.
pub fn threshold_for(level: u32) -> i64 {
    let l = i64::from(level.max(1));
    STEP.saturating_mul(l).saturating_mul(l - 1)
}

/// Level reached with `xp` total. Totals at or below zero are level 1.
pub fn level_for(xp: i64) -> u32 {
    if xp <= 0 {
        return 1;
    }
    // threshold_for(L) <= xp  <=>  L * (L - 1) <= xp / 50, since the left side is an integer
    let q = xp / STEP;
    let estimate = ((1.0 + (1.0 + 4.0 * q as f64).sqrt()) / 2.0).floor() as i64;
    let mut level = estimate.max(1);
    // the float estimate can be off by one near perfect squares
    while level > 1 && level * (level - 1) > q {
        level -= 1;
    }
    while (level + 1) * level <= q {
        level += 1;
    }
    u32::try_from(level).unwrap_or(u32::MAX)
}

/// Display title for a level
pub fn title_for(level: u32) -> &'static str {
    TITLES
        .iter()
        .rev()
        .find(|(from, _)| level >= *from)
        .map(|(_, title)| *title)
        .unwrap_or(TITLES[0].1)
}

/// Level details derived from a total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub total_xp: i64,
    pub level: u32,
    pub title: String,
    /// XP at which the current level started
    pub current_level_xp: i64,
    /// XP at which the next level starts
    pub next_level_xp: i64,
}

impl LevelProgress {
    pub fn new(total_xp: i64) -> Self {
        let level = level_for(total_xp);
        Self {
            total_xp,
            level,
            title: title_for(level).to_string(),
            current_level_xp: threshold_for(level),
            next_level_xp: threshold_for(level.saturating_add(1)),
        }
    }

    /// Progress through the current level (0.0 - 1.0)
    pub fn progress_to_next(&self) -> f32 {
        let span = self.next_level_xp - self.current_level_xp;
        if span <= 0 {
            return 1.0;
        }
        let into = (self.total_xp - self.current_level_xp).max(0);
        (into as f32 / span as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_thresholds() {
        assert_eq!(threshold_for(1), 0);
        assert_eq!(threshold_for(2), 100);
        assert_eq!(threshold_for(3), 300);
        assert_eq!(threshold_for(4), 600);
        assert_eq!(threshold_for(10), 4500);

        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(99), 1);
        assert_eq!(level_for(100), 2);
        assert_eq!(level_for(299), 2);
        assert_eq!(level_for(300), 3);
        assert_eq!(level_for(-40), 1);
    }

    #[test]
    fn test_inversion_over_full_low_range() {
        for xp in 0..=1_000_000i64 {
            let level = level_for(xp);
            assert!(threshold_for(level) <= xp, "xp {xp} level {level}");
            assert!(xp < threshold_for(level + 1), "xp {xp} level {level}");
        }
    }

    #[test]
    fn test_threshold_strictly_increasing() {
        for level in 1..5_000u32 {
            assert!(threshold_for(level) < threshold_for(level + 1), "level {level}");
        }
    }

    #[test]
    fn test_titles() {
        assert_eq!(title_for(1), "Apprentice");
        assert_eq!(title_for(3), "Novice");
        assert_eq!(title_for(14), "Expert");
        assert_eq!(title_for(400), "Luminary");
    }

    #[test]
    fn test_progress_to_next() {
        let progress = LevelProgress::new(150); // level 2 spans 100..300
        assert_eq!(progress.level, 2);
        assert_eq!(progress.next_level_xp, 300);
        assert!((progress.progress_to_next() - 0.25).abs() < 0.001);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2_000))]

        #[test]
        fn prop_level_threshold_inversion(xp in 0i64..1_000_000_000_000) {
            let level = level_for(xp);
            prop_assert!(threshold_for(level) <= xp);
            prop_assert!(xp < threshold_for(level + 1));
        }

        #[test]
        fn prop_level_for_non_decreasing(a in 0i64..10_000_000, b in 0i64..10_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(level_for(lo) <= level_for(hi));
        }
    }
}
