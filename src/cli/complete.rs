//! Complete command implementation

use anyhow::Result;

use trailhead::CompletionPayload;

use super::Context;

/// Record a completion and print what it earned
pub async fn complete_command(
    ctx: &Context,
    learner: &str,
    node: &str,
    payload: Option<&str>,
    timezone: Option<&str>,
) -> Result<()> {
    let payload = payload.map(CompletionPayload::from_json).transpose()?;
    let engine = ctx.engine()?;
    let outcome =
        engine.record_completion_at(learner, node, payload.as_ref(), timezone, chrono::Utc::now())?;

    if ctx.emit_json(&outcome)? {
        return Ok(());
    }

    if outcome.is_duplicate() {
        println!("{node} was already completed by {learner}; nothing new credited.");
        return Ok(());
    }

    println!("Completed {node}");
    for rolled in &outcome.completion.rolled_up {
        println!("  {} {} complete", rolled.kind, rolled.node_id);
    }
    for award in outcome.awards.iter().chain(&outcome.streak.awards) {
        if award.awarded {
            println!("  +{} XP ({})", award.amount, award.reason);
        }
    }
    println!("Total: {} XP, level {}", outcome.total_xp, outcome.level);
    if let Some(level_up) = &outcome.level_up {
        println!("Level up! {} -> {} ({})", level_up.old_level, level_up.new_level, level_up.new_title);
    }
    println!(
        "Streak: {} day(s), best {}",
        outcome.streak.current, outcome.streak.longest
    );
    if !outcome.newly_unlocked.is_empty() {
        println!("Unlocked: {}", outcome.newly_unlocked.join(", "));
    }
    Ok(())
}
