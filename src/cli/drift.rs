//! Reconciliation commands

use anyhow::Result;
use std::time::Duration;

use trailhead::progression::{DriftRun, ProgressionEngine};

use super::Context;

/// Check for drift once, or every `interval` seconds with `--watch`
pub async fn drift_command(ctx: &Context, learner: Option<&str>, watch: bool, interval: u64) -> Result<()> {
    let engine = ctx.engine()?;

    if !watch {
        let run = engine.check_drift(learner)?;
        print_run(ctx, &run)?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    tracing::info!(interval, "Watching for XP drift (Ctrl+C to stop)");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_blocking(&engine, learner).await {
                    Ok(run) => print_run(ctx, &run)?,
                    // A failed pass is retried on the next tick
                    Err(e) => tracing::error!("Drift check failed: {e:#}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping drift watch");
                return Ok(());
            }
        }
    }
}

async fn run_blocking(engine: &ProgressionEngine, learner: Option<&str>) -> Result<DriftRun> {
    let engine = engine.clone();
    let learner = learner.map(str::to_string);
    let run = tokio::task::spawn_blocking(move || engine.check_drift(learner.as_deref())).await??;
    Ok(run)
}

fn print_run(ctx: &Context, run: &DriftRun) -> Result<()> {
    if ctx.emit_json(run)? {
        return Ok(());
    }
    let drifted: Vec<_> = run.drifted().collect();
    if drifted.is_empty() {
        println!("Checked {} learner(s): no drift", run.checked);
        return Ok(());
    }
    println!(
        "Checked {} learner(s): {} drifted (run {})",
        run.checked,
        drifted.len(),
        run.run_id
    );
    for report in drifted {
        println!(
            "  {}: cached {} / ledger {} (delta {:+}), level {} expected {} [{}]",
            report.learner_id,
            report.cached_total,
            report.ledger_total,
            report.delta,
            report.cached_level,
            report.expected_level,
            report.formula_version
        );
    }
    Ok(())
}

/// Recompute the learner's cached total and level from the ledger
pub async fn rebuild_command(ctx: &Context, learner: &str) -> Result<()> {
    let engine = ctx.engine()?;
    let (before, after) = engine.rebuild_state(learner)?;

    if ctx.emit_json(&serde_json::json!({ "before": before, "after": after }))? {
        return Ok(());
    }
    println!(
        "Rebuilt {learner}: {} XP (level {}) -> {} XP (level {})",
        before.total_xp, before.level, after.total_xp, after.level
    );
    Ok(())
}
