//! Trailhead - progression and gamification for hierarchical learning content
//!
//! Learners move through zones, chapters, phases and pages. Trailhead decides
//! which nodes are unlocked, records completions and rolls them up the
//! hierarchy, and credits XP, levels and daily streaks exactly once per
//! qualifying event, even when requests are retried or arrive concurrently.
//!
//! ## Sources of truth
//!
//! 1. **Ledger**: `xp_events` is append-only; a learner's XP is the sum of
//!    their rows.
//! 2. **Projection**: `gamification_state` caches the total, level and
//!    streak. It is written in the same transaction as the ledger rows it
//!    reflects and can be rebuilt from them.
//!
//! The reconciliation checker compares the two and reports drift.

pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod progression;

pub use domain::*;
pub use error::{EngineError, EngineResult};
