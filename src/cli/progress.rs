//! Progress command implementation

use anyhow::Result;

use trailhead::progression::ProgressView;

use super::Context;

/// Print the progress tree under `scope`
pub async fn progress_command(ctx: &Context, learner: &str, scope: &str) -> Result<()> {
    let engine = ctx.engine()?;
    let view = engine.get_progress(learner, scope)?;

    if ctx.emit_json(&view)? {
        return Ok(());
    }
    print_node(&view, 0);
    Ok(())
}

fn print_node(view: &ProgressView, depth: usize) {
    let marker = if view.completed {
        "[x]"
    } else if view.unlocked {
        "[ ]"
    } else {
        "[-]"
    };
    let title = if view.title.is_empty() {
        String::new()
    } else {
        format!(" {}", view.title)
    };
    println!(
        "{}{} {} {}{} ({}%)",
        "  ".repeat(depth),
        marker,
        view.kind,
        view.node_id,
        title,
        view.percentage
    );
    for child in &view.children {
        print_node(child, depth + 1);
    }
}
