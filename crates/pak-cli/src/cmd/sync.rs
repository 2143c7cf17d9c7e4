use anyhow::Result;

use super::Context;

/// Reconcile command symlinks with the lock store.
pub fn sync(ctx: &Context) -> Result<()> {
    let lock = ctx.manager.lock_store().lock()?;
    ctx.manager.symlinks().sync(&lock)?;
    let linked = ctx
        .manager
        .symlinks()
        .entries()
        .iter()
        .filter(|e| e.registered)
        .count();
    println!(
        "  {linked} command(s) linked in {}",
        ctx.config.bin_dir.display()
    );
    Ok(())
}
