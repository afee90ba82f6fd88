//! Content catalog commands

use anyhow::Result;
use std::path::Path;

use trailhead::progression::CatalogFile;

use super::Context;

/// Replace the content tree with the nodes in a TOML catalog
pub async fn import_command(ctx: &Context, file: &Path) -> Result<()> {
    let tree = CatalogFile::from_path(file)?.into_tree()?;
    let engine = ctx.engine()?;
    let count = engine.import_catalog(&tree)?;

    if ctx.emit_json(&serde_json::json!({ "nodes": count, "zones": tree.zones().len() }))? {
        return Ok(());
    }
    println!(
        "Imported {} nodes in {} zones from {}",
        count,
        tree.zones().len(),
        file.display()
    );
    Ok(())
}
