//! Core domain types for trailhead

mod node;
mod payload;
mod state;
mod xp;

pub use node::{NodeKind, ProgressNode, UnlockRule};
pub use payload::{CompletionPayload, PayloadKind, MAX_RATING, MAX_REFLECTION_CHARS};
pub use state::GamificationState;
pub use xp::{ReasonCode, XpEvent};

/// Stable learner identifier supplied by the identity provider
pub type LearnerId = String;

/// Content node identifier supplied by the authoring store
pub type NodeId = String;
