mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use patchdeck::{MatchPolicy, PatchConfig};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use commands::image::LibImage;

#[derive(Parser)]
#[command(name = "patchdeck")]
#[command(version, about = "Catalog tooling for runtime byte patches")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, default_value = "patchdeck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load catalogs against module images and print every component's state
    Check {
        /// Catalog directory (defaults to the configured one)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Primary module image
        #[arg(long)]
        image: PathBuf,
        /// Additional module image as NAME=FILE
        #[arg(long = "lib", value_name = "NAME=FILE")]
        libs: Vec<LibImage>,
        /// Target version used for version gates
        #[arg(long)]
        target_version: Option<String>,
        /// Override the configured match policy (first, unique, all)
        #[arg(long)]
        match_policy: Option<MatchPolicy>,
    },
    /// Scan a module image for a byte pattern
    Scan {
        /// Module image
        #[arg(long)]
        image: PathBuf,
        /// Pattern such as "48 8B ?? 05"
        #[arg(long)]
        pattern: String,
        /// Maximum number of matches to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Enable toggles on a module image and write the patched copy
    Apply {
        /// Catalog directory (defaults to the configured one)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Primary module image
        #[arg(long)]
        image: PathBuf,
        /// Additional module image as NAME=FILE
        #[arg(long = "lib", value_name = "NAME=FILE")]
        libs: Vec<LibImage>,
        /// Toggle ids to enable
        #[arg(long = "enable", required = true)]
        enable: Vec<String>,
        /// Target version used for version gates
        #[arg(long)]
        target_version: Option<String>,
        /// Where to write the patched primary image
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("patchdeck=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    match args.command {
        Command::Check {
            catalog,
            image,
            libs,
            target_version,
            match_policy,
        } => {
            let config = override_config(config, catalog, target_version, match_policy);
            commands::check::run(&config, &image, &libs)
        }
        Command::Scan {
            image,
            pattern,
            limit,
        } => commands::scan::run(&image, &pattern, limit),
        Command::Apply {
            catalog,
            image,
            libs,
            enable,
            target_version,
            output,
        } => {
            let config = override_config(config, catalog, target_version, None);
            commands::apply::run(&config, &image, &libs, &enable, &output)
        }
    }
}

/// A missing config file means defaults; a broken one is an error.
fn load_config(path: &Path) -> Result<PatchConfig> {
    match PatchConfig::load(path) {
        Ok(config) => {
            debug!("Loaded config from {:?}", path);
            Ok(config)
        }
        Err(e) if e.is_not_found() => {
            debug!("No config at {:?}, using defaults", path);
            Ok(PatchConfig::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Err(e).with_context(|| format!("invalid config file {}", path.display()))
        }
    }
}

fn override_config(
    mut config: PatchConfig,
    catalog: Option<PathBuf>,
    target_version: Option<String>,
    match_policy: Option<MatchPolicy>,
) -> PatchConfig {
    if let Some(catalog) = catalog {
        config.catalog_dir = catalog;
    }
    if target_version.is_some() {
        config.target_version = target_version;
    }
    if let Some(policy) = match_policy {
        config.match_policy = policy;
    }
    config
}
