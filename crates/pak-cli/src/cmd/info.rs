//! Info command

use anyhow::Result;
use crossterm::style::Stylize;

use super::Context;

/// Show an installed package and its locked versions.
pub fn info(ctx: &Context, name: &str, version: Option<&str>) -> Result<()> {
    let package = ctx.manager.package(name)?;
    let shown: Vec<String> = match version {
        Some(v) => vec![ctx.manager.package_version(name, v)?.version],
        None => package.versions().into_iter().map(str::to_string).collect(),
    };
    let lw = 12;

    println!();
    println!(
        "  {} {}",
        package.name.as_str().white().bold(),
        package.latest_version.as_deref().unwrap_or("?").dark_grey()
    );

    for version in &shown {
        let Some(entry) = package.versions.get(version) else {
            continue;
        };
        println!();
        println!("  {:<lw$}{}", "version", entry.version);
        println!("  {:<lw$}{}", "compiler", entry.compiler);
        println!("  {:<lw$}{}", "location", entry.location.display());
        if !entry.execution_units.is_empty() {
            println!("  {:<lw$}{}", "units", entry.execution_units.join(", "));
        }
        if let Some(main) = &entry.main_execution_policy {
            println!("  {:<lw$}{}", "main", main);
        }
        if !entry.dependencies.is_empty() {
            let deps: Vec<String> = entry
                .dependencies
                .iter()
                .map(|d| format!("{}={}", d.name, d.version))
                .collect();
            println!("  {:<lw$}{}", "requires", deps.join(", "));
        }
    }

    if let Some(link) = ctx
        .manager
        .symlinks()
        .entries()
        .into_iter()
        .find(|e| e.package == package.name && e.registered)
    {
        println!();
        println!(
            "  {:<lw$}{}",
            "command",
            ctx.manager.symlinks().link_path(&link.package).display()
        );
    }

    Ok(())
}
