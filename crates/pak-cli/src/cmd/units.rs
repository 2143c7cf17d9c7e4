use anyhow::Result;

use super::Context;

/// List the units registered for a package version.
pub fn units(ctx: &Context, package: &str, version: &str) -> Result<()> {
    let entry = ctx.manager.package_version(package, version)?;
    let units = ctx.manager.units().units(package, &entry.version)?;
    if units.is_empty() {
        println!("  {package}={} has no execution units.", entry.version);
        return Ok(());
    }
    for unit in units {
        let marker = if entry.main_execution_policy.as_deref() == Some(unit.as_str()) {
            " (main)"
        } else {
            ""
        };
        println!("  {unit}{marker}");
    }
    Ok(())
}
