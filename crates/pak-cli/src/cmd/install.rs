//! Install command

use std::path::Path;

use anyhow::{Result, bail};
use pak_core::InstallOptions;
use tracing::debug;

use super::Context;

/// How an install target is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    File(&'a Path),
    Remote(&'a str),
}

/// Existing files win; anything naming a source (`@`) is remote.
pub fn classify(target: &str) -> Option<Target<'_>> {
    let path = Path::new(target);
    if path.is_file() {
        Some(Target::File(path))
    } else if target.contains('@') {
        Some(Target::Remote(target))
    } else {
        None
    }
}

pub fn install(ctx: &Context, targets: &[String], options: &InstallOptions) -> Result<()> {
    for target in targets {
        let outcome = match classify(target) {
            Some(Target::File(path)) => ctx.manager.install(path, options)?,
            Some(Target::Remote(locator)) => ctx.manager.install_remote(locator, options)?,
            None => bail!("'{target}' is neither a package file nor a remote locator"),
        };
        debug!(
            "{}={} (changed: {})",
            outcome.package, outcome.version, outcome.changed
        );
    }
    Ok(())
}
