//! Progression and gamification engine
//!
//! Decides what a learner may do next, records what they did, and credits
//! XP, levels and streaks for it in `progress.db`.
//!
//! # Architecture
//!
//! ```text
//!  record_completion
//!         │
//!         ▼
//!   ┌────────────┐   unlock check   ┌─────────────┐
//!   │  engine    │ ───────────────▶ │ UnlockGraph │
//!   └─────┬──────┘                  └─────────────┘
//!         │ one IMMEDIATE transaction
//!         ├──▶ ProgressTracker  (completion_records, roll-up)
//!         ├──▶ XpLedger         (xp_events, dedup_key UNIQUE)
//!         └──▶ StreakTracker    (compare-and-set on last_active_day)
//!                   │
//!                   ▼
//!          gamification_state  ◀── ReconciliationChecker (read + report)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = ProgressionEngine::open(&db_path, config)?;
//! engine.import_catalog(&CatalogFile::from_path(&catalog)?.into_tree()?)?;
//!
//! let outcome = engine.record_completion("learner-1", "intro-p1", None)?;
//! if !outcome.is_duplicate() {
//!     println!("+{} XP", outcome.xp_awarded);
//! }
//! ```

mod catalog;
mod db;
mod engine;
mod ledger;
mod models;
mod projection;
mod reconcile;
mod roles;
mod streaks;
mod tracker;
mod unlock;

pub mod day_key;
pub mod levels;

pub use catalog::{CatalogEntry, CatalogFile, ContentTree};
pub use db::EngineDb;
pub use engine::ProgressionEngine;
pub use ledger::XpLedger;
pub use levels::{level_for, threshold_for, title_for, LevelProgress, FORMULA_VERSION};
pub use models::{
    AdjustResult, AwardResult, CompletionOutcome, CompletionRecord, CompletionResult, DriftReport,
    GamificationSnapshot, LevelUp, ProgressView, RolledUpNode, StreakResult,
};
pub use reconcile::{DriftRun, ReconciliationChecker};
pub use roles::{AdminList, RoleProvider};
pub use streaks::{effective_streak, StreakTracker};
pub use tracker::{is_complete, percentage, ProgressTracker};
pub use unlock::UnlockGraph;
