use anyhow::{Context as _, Result};

use super::Context;
use crate::ui::tree::render_tree;

/// Print the dependency tree of one package or of everything installed.
pub fn tree(ctx: &Context, package: Option<&str>, json: bool) -> Result<()> {
    let tree = ctx.manager.package_tree(package)?;

    if json {
        let out = serde_json::to_string_pretty(&tree).context("Failed to encode tree")?;
        println!("{out}");
        return Ok(());
    }

    if tree.is_empty() {
        println!("  No packages installed.");
        return Ok(());
    }
    for line in render_tree(&tree) {
        println!("{line}");
    }
    Ok(())
}
