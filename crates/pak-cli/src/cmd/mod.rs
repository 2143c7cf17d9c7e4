//! Command implementations
//!
//! Every command except `completions` runs on a blocking thread through
//! [`dispatch`] and returns the process exit code.

pub mod completions;
pub mod exec;
pub mod info;
pub mod install;
pub mod list;
pub mod source;
pub mod sync;
pub mod tree;
pub mod uninstall;
pub mod units;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use pak_core::fetch::{HttpTransport, RemoteFetcher};
use pak_core::runner::SystemRunners;
use pak_core::{Config, DetectedScope, Layout, PackageManager, Reporter, ScopeResolver, system_root};
use pak_schema::Credential;
use tokio::runtime::Handle;

use crate::ui::TermReporter;
use crate::{Commands, SourceCommands};

/// Everything a command needs, wired from the environment.
#[derive(Debug)]
pub struct Context {
    pub manager: PackageManager,
    pub config: Config,
}

impl Context {
    /// Both scopes share the system root; the user scope only reads it.
    pub fn load(runtime: Handle, quiet: bool) -> Result<Self> {
        let root = system_root();
        let scope: Arc<dyn ScopeResolver> = Arc::new(DetectedScope::new(&root));
        let layout = Layout::new(root);
        let config = Config::for_layout(&layout).context("Failed to load config")?;
        let reporter: Arc<dyn Reporter> = Arc::new(TermReporter::new(quiet));
        let runners = Arc::new(SystemRunners::with_overrides(config.runners.clone()));
        let transport =
            Arc::new(HttpTransport::new(&config.network).context("Failed to create HTTP client")?);

        let mut manager = PackageManager::new(layout.clone(), &config, scope, runners, reporter);
        let fetcher = RemoteFetcher::new(
            Arc::clone(manager.sources()),
            transport,
            runtime,
            layout.tmp_dir(),
        );
        manager = manager.with_fetcher(fetcher);
        if let Ok(exe) = std::env::current_exe() {
            manager = manager.with_program(exe);
        }
        if let Some(credential) = credential_from_env() {
            manager = manager.with_credential(credential);
        }
        Ok(Self { manager, config })
    }
}

/// `PAK_TOKEN`, or `PAK_USERNAME` with `PAK_PASSWORD`.
fn credential_from_env() -> Option<Credential> {
    if let Ok(token) = std::env::var("PAK_TOKEN") {
        return Some(Credential::Token(token));
    }
    match (std::env::var("PAK_USERNAME"), std::env::var("PAK_PASSWORD")) {
        (Ok(username), Ok(password)) => Some(Credential::Basic { username, password }),
        _ => None,
    }
}

/// Run one command and return the exit code.
pub fn dispatch(command: Commands, runtime: Handle, quiet: bool) -> Result<i32> {
    let ctx = Context::load(runtime, quiet)?;
    match command {
        Commands::Install {
            targets,
            reinstall,
            skip_dependencies,
            skip_repositories,
            prefer_static,
            build_source,
        } => {
            let options = pak_core::InstallOptions {
                reinstall,
                skip_dependencies,
                skip_repositories,
                prefer_static,
                build_source,
            };
            install::install(&ctx, &targets, &options)?;
            Ok(0)
        }
        Commands::Uninstall { package, version } => {
            uninstall::uninstall(&ctx, &package, version.as_deref())?;
            Ok(0)
        }
        Commands::List { json } => {
            list::list(&ctx, json)?;
            Ok(0)
        }
        Commands::Info { package, version } => {
            info::info(&ctx, &package, version.as_deref())?;
            Ok(0)
        }
        Commands::Tree { package, json } => {
            tree::tree(&ctx, package.as_deref(), json)?;
            Ok(0)
        }
        Commands::Units { package, version } => {
            units::units(&ctx, &package, &version)?;
            Ok(0)
        }
        Commands::Exec {
            package,
            version,
            unit,
            args,
        } => exec::exec(&ctx, &package, &version, unit.as_deref(), &args),
        Commands::Source { command } => {
            match command {
                SourceCommands::Add {
                    name,
                    kind,
                    host,
                    insecure,
                } => source::add(&ctx, &name, &kind, &host, !insecure)?,
                SourceCommands::Remove { name } => source::remove(&ctx, &name)?,
                SourceCommands::List => source::list(&ctx)?,
            }
            Ok(0)
        }
        Commands::Sync => {
            sync::sync(&ctx)?;
            Ok(0)
        }
        Commands::Completions { shell } => {
            completions::completions(shell);
            Ok(0)
        }
    }
}
