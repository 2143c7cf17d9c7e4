use anyhow::{Context as _, Result};

use super::Context;
use crate::ui::table::packages_table;

/// List all installed packages
pub fn list(ctx: &Context, json: bool) -> Result<()> {
    let packages = ctx.manager.installed_packages()?;

    if json {
        let out = serde_json::to_string_pretty(&packages).context("Failed to encode packages")?;
        println!("{out}");
        return Ok(());
    }

    if packages.is_empty() {
        println!();
        println!("  No packages installed.");
        println!("  Run 'pak install <file.pak>' to get started.");
        return Ok(());
    }

    println!("{}", packages_table(&packages));
    Ok(())
}
