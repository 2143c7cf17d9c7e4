//! Remote source management

use anyhow::{Result, bail};
use pak_core::sources::is_builtin;
use pak_schema::{DefinedRemoteSource, RemoteSourceKind};

use super::Context;
use crate::ui::table::sources_table;

pub fn add(ctx: &Context, name: &str, kind: &str, host: &str, ssl: bool) -> Result<()> {
    if is_builtin(name) {
        bail!("'{name}' is a built-in source and cannot be redefined");
    }
    let kind: RemoteSourceKind = kind.parse()?;
    let added = ctx.manager.sources().add(DefinedRemoteSource {
        name: name.to_string(),
        kind,
        host: host.to_string(),
        ssl,
    })?;
    if added {
        println!("  Added source '{name}'");
    } else {
        println!("  Source '{name}' is already defined");
    }
    Ok(())
}

pub fn remove(ctx: &Context, name: &str) -> Result<()> {
    if !ctx.manager.sources().remove(name)? {
        bail!("Source '{name}' not found");
    }
    println!("  Removed source '{name}'");
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let sources = ctx.manager.sources().list()?;
    println!("{}", sources_table(&sources));
    Ok(())
}
