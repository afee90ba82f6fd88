//! Adjust command implementation

use anyhow::Result;

use super::Context;

/// Apply an admin XP adjustment
pub async fn adjust_command(
    ctx: &Context,
    learner: &str,
    delta: i64,
    reason: &str,
    actor: &str,
) -> Result<()> {
    let engine = ctx.engine()?;
    let result = engine.adjust_xp(learner, delta, reason, actor)?;

    if ctx.emit_json(&result)? {
        return Ok(());
    }
    println!(
        "Adjusted {learner} by {delta:+} XP (event #{}): total {} XP, level {}",
        result.event_id, result.total_xp, result.level
    );
    if result.level != result.old_level {
        println!("  Level changed {} -> {}", result.old_level, result.level);
    }
    Ok(())
}
