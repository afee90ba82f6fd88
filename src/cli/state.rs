//! Learner state commands

use anyhow::Result;

use super::Context;

/// Show XP, level and streak
pub async fn state_command(ctx: &Context, learner: &str) -> Result<()> {
    let engine = ctx.engine()?;
    let state = engine.get_gamification_state(learner)?;

    if ctx.emit_json(&state)? {
        return Ok(());
    }
    println!("Learner {}", state.learner_id);
    println!("  Level {} - {}", state.level, state.title);
    println!(
        "  XP: {} (next level at {}, {:.0}% there)",
        state.total_xp,
        state.next_level_xp,
        state.progress_to_next * 100.0
    );
    println!(
        "  Streak: {} day(s), best {}",
        state.current_streak, state.longest_streak
    );
    if let Some(day) = &state.last_active_day {
        println!("  Last active: {day}");
    }
    Ok(())
}

/// Store the learner's timezone
pub async fn timezone_command(ctx: &Context, learner: &str, timezone: &str) -> Result<()> {
    let engine = ctx.engine()?;
    engine.set_timezone(learner, timezone)?;

    if ctx.emit_json(&serde_json::json!({ "learner_id": learner, "timezone": timezone }))? {
        return Ok(());
    }
    println!("Timezone for {learner} set to {timezone}");
    Ok(())
}
