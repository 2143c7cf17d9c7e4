//! Exec command
//!
//! Unit launchers call `pak exec --package P --version V --unit U -- args`.

use anyhow::{Result, anyhow};
use pak_core::UnitExit;

use super::Context;

pub fn exec(
    ctx: &Context,
    package: &str,
    version: &str,
    unit: Option<&str>,
    args: &[String],
) -> Result<i32> {
    let entry = ctx.manager.package_version(package, version)?;
    let unit = match unit {
        Some(u) => u.to_string(),
        None => entry
            .main_execution_policy
            .clone()
            .ok_or_else(|| anyhow!("{package}={} has no main execution policy", entry.version))?,
    };
    let exit = ctx
        .manager
        .units()
        .execute_unit(package, &entry.version, &unit, args)?;
    Ok(exit_code(exit))
}

/// An end-process handle wins over the interpreter's own code.
pub fn exit_code(exit: UnitExit) -> i32 {
    exit.terminate.or(exit.code).unwrap_or(1)
}
