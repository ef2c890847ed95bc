// Copyright © 2024 BundleFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # BundleFlow CLI
//!
//! Command-line entry point: prints dependency reports, lists the request
//! paths of a node and renders content to standard output.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};

use bundleflow::core::config::Profile;
use bundleflow::model::BundlableKind;
use bundleflow::{Bundler, ConfigBuilder};

const ENV_PREFIX: &str = "BUNDLEFLOW_";

/// Main command-line interface for BundleFlow.
#[derive(Parser)]
#[command(
    name = "bundleflow",
    version,
    about = "Bundles and serves the assets of modular JavaScript applications"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Application directory, overriding the configured one
    #[arg(short, long, global = true)]
    app_dir: Option<PathBuf>,

    /// Verbose mode (-v, -vv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum NodeKind {
    Aspect,
    Workbench,
}

impl From<NodeKind> for BundlableKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Aspect => BundlableKind::Aspect,
            NodeKind::Workbench => BundlableKind::Workbench,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dependency tree of an aspect or workbench
    Deps {
        /// Kind of the node
        kind: NodeKind,

        /// Name of the aspect or blade
        name: String,

        /// Report the module this alias resolves to instead
        #[arg(long)]
        alias: Option<String>,

        /// Show every occurrence of repeated assets
        #[arg(short = 'A', long)]
        all: bool,
    },

    /// List the request paths of an aspect or workbench
    Paths {
        /// Kind of the node
        kind: NodeKind,

        /// Name of the aspect or blade
        name: String,

        /// List production paths regardless of the configured profile
        #[arg(long)]
        prod: bool,
    },

    /// Render the content of a request path to standard output
    Content {
        /// Kind of the node
        kind: NodeKind,

        /// Name of the aspect or blade
        name: String,

        /// The request path, e.g. `common-js/bundle.js`
        path: String,
    },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn open_bundler(cli: &Cli) -> anyhow::Result<Bundler> {
    let mut builder = ConfigBuilder::new().with_env_prefix(ENV_PREFIX);
    if let Some(path) = &cli.config {
        builder = builder.with_file(path);
    }
    if let Some(app_dir) = &cli.app_dir {
        builder = builder.with_override("app_dir", app_dir.to_string_lossy().into_owned());
    }
    let config = builder.build().context("Failed to load configuration")?;
    Bundler::open(config).context("Failed to open the application")
}

/// Runs the selected subcommand.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the application cannot
/// be discovered, the node does not exist or content cannot be produced.
fn run(cli: &Cli) -> anyhow::Result<()> {
    let bundler = open_bundler(cli)?;

    match &cli.command {
        Commands::Deps {
            kind,
            name,
            alias,
            all,
        } => {
            let node = bundler.node((*kind).into(), name)?;
            let report = match alias {
                Some(alias) => bundler.alias_report(node, alias, *all),
                None => bundler.dependency_report(node, *all),
            }
            .context("Failed to build the dependency report")?;
            println!("{}", report);
        }
        Commands::Paths { kind, name, prod } => {
            let node = bundler.node((*kind).into(), name)?;
            let profile = if *prod {
                Profile::Production
            } else {
                bundler.config().read().profile
            };
            let paths = bundler
                .valid_content_paths(node, profile)
                .context("Failed to enumerate request paths")?;
            for path in paths {
                println!("{}", path);
            }
        }
        Commands::Content { kind, name, path } => {
            let node = bundler.node((*kind).into(), name)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let written = bundler
                .write_content(node, path, &mut out)
                .with_context(|| format!("Failed to render '{}'", path))?;
            out.flush().context("Failed to flush standard output")?;
            info!("Wrote {} bytes for '{}'", written, path);
        }
    }
    Ok(())
}

/// The main entry point for the BundleFlow CLI.
fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = run(&cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
