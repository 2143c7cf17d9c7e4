//! pak - package installation and execution runtime
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! # Overview
//!
//! `pak` installs `.pak` package files (or fetches them from a remote
//! source), registers their execution units and exposes the main unit as a
//! command. Launchers written for each unit re-enter `pak exec`.
//!
//! # Directory Layout
//!
//! ```text
//! /var/lib/pak/           (PAK_ROOT)
//! ├── package.lck         # Lock store
//! ├── symlinks.reg        # Symlink registry
//! ├── sources.reg         # Remote sources
//! ├── runners/            # Execution unit indexes, scripts and launchers
//! ├── packages/           # Install trees by package/version
//! └── config.toml
//! ```

pub mod cmd;
pub mod ui;

pub use pak_core::USER_AGENT;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pak")]
#[command(author, version, about = "pak - install packages and run their execution units")]
pub struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install package files or remote packages
    Install {
        /// Package file path, or remote locator: vendor/project[=version]@source
        #[arg(required = true)]
        targets: Vec<String>,
        /// Replace versions that are already installed
        #[arg(long)]
        reinstall: bool,
        /// Do not install dependencies (static-link dependencies are still checked)
        #[arg(long)]
        skip_dependencies: bool,
        /// Do not register repositories declared by the package
        #[arg(long)]
        skip_repositories: bool,
        /// Prefer statically linked package assets when fetching
        #[arg(long = "static")]
        prefer_static: bool,
        /// Build remote packages from source
        #[arg(long)]
        build_source: bool,
    },
    /// Uninstall a package
    Uninstall {
        /// Package name, optionally with version: pkg or pkg=1.0.0
        package: String,
        /// Version to remove (all versions if omitted)
        #[arg(long)]
        version: Option<String>,
    },
    /// List installed packages
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show an installed package
    Info {
        /// Package name
        package: String,
        /// Only show this version (`latest` accepted)
        #[arg(long)]
        version: Option<String>,
    },
    /// Show the dependency tree
    Tree {
        /// Package name (all packages if omitted)
        package: Option<String>,
        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// List the execution units of a package version
    Units {
        /// Package name
        package: String,
        /// Version
        #[arg(default_value = "latest")]
        version: String,
    },
    /// Run an execution unit
    Exec {
        /// Package name
        #[arg(long)]
        package: String,
        /// Version
        #[arg(long, default_value = "latest")]
        version: String,
        /// Unit name (the main execution policy if omitted)
        #[arg(long)]
        unit: Option<String>,
        /// Arguments passed to the unit
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Manage remote sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
    /// Reconcile command symlinks with installed packages
    Sync,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// Define a remote source
    Add {
        /// Name used after `@` in locators
        name: String,
        /// API flavour: github or gitlab
        kind: String,
        /// API host, e.g. gitlab.example.com
        host: String,
        /// Use plain HTTP
        #[arg(long)]
        insecure: bool,
    },
    /// Remove a remote source
    Remove {
        /// Source name
        name: String,
    },
    /// List remote sources
    List,
}
