//! Uninstall command

use anyhow::Result;

use super::Context;

/// Split `pkg=1.0.0` into name and version.
pub fn parse_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('=') {
        Some((name, version)) if !version.is_empty() => (name, Some(version)),
        Some((name, _)) => (name, None),
        None => (spec, None),
    }
}

pub fn uninstall(ctx: &Context, spec: &str, version: Option<&str>) -> Result<()> {
    let (name, spec_version) = parse_spec(spec);
    match version.or(spec_version) {
        Some(v) => {
            let entry = ctx.manager.package_version(name, v)?;
            ctx.manager.uninstall_package_version(name, &entry.version)?;
        }
        None => {
            let removed = ctx.manager.uninstall_package(name)?;
            tracing::info!("Removed {removed} version(s) of {name}");
        }
    }
    Ok(())
}
