//! graphzfs command-line interface for driving layer storage by hand.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphzfs_core::{
    config::{GraphzfsConfig, DEFAULT_CONFIG_PATH},
    logging,
    registry::{BoxedDriver, DriverRegistry},
    GraphDriver, Lookup,
};
use log::warn;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "graphzfs",
    version,
    about = "Create, inspect, and remove container layers stored as ZFS datasets."
)]
struct Cli {
    /// Path to the graphzfs configuration file.
    #[arg(short, long, env = "GRAPHZFS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a layer, optionally as a copy-on-write child of another layer.
    Create {
        id: String,

        /// Parent layer id.
        #[arg(long)]
        parent: Option<String>,
    },

    /// Remove a layer; clones of its snapshots are promoted first.
    Remove { id: String },

    /// Print the mountpoint of a layer.
    Get {
        id: String,

        #[arg(long, default_value = "")]
        mount_label: String,
    },

    /// Exit 0 when the layer exists, 1 when it is missing, 2 on backend errors.
    Exists { id: String },

    /// Print driver name and status rows.
    Status,

    /// Report configuration problems.
    Validate,

    /// Print the JSON schema of the configuration file.
    Schema,
}

fn main() -> ExitCode {
    logging::init("warn");
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Schema => {
            let schema = schema_for!(GraphzfsConfig);
            println!("{}", to_string_pretty(&schema)?);
        }
        Commands::Validate => {
            let config = load_cli_config(&cli.config)?;
            let issues = config.validate();
            if issues.is_empty() {
                println!("{}: ok", config.path.display());
            } else {
                for issue in &issues {
                    println!("- {issue}");
                }
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Create { id, parent } => {
            let driver = open_driver(&cli.config)?;
            driver
                .create(&id, parent.as_deref())
                .with_context(|| format!("create layer {id}"))?;
        }
        Commands::Remove { id } => {
            let driver = open_driver(&cli.config)?;
            driver
                .remove(&id)
                .with_context(|| format!("remove layer {id}"))?;
        }
        Commands::Get { id, mount_label } => {
            let driver = open_driver(&cli.config)?;
            let path = driver
                .get(&id, &mount_label)
                .with_context(|| format!("get layer {id}"))?;
            println!("{}", path.display());
            driver.put(&id);
        }
        Commands::Exists { id } => {
            let driver = open_driver(&cli.config)?;
            return Ok(match driver.lookup(&id) {
                Ok(Lookup::Found(_)) => {
                    println!("true");
                    ExitCode::SUCCESS
                }
                Ok(Lookup::Missing) => {
                    println!("false");
                    ExitCode::from(1)
                }
                Err(err) => {
                    warn!("lookup of {id} failed: {err}");
                    eprintln!("error: {err}");
                    ExitCode::from(2)
                }
            });
        }
        Commands::Status => {
            let driver = open_driver(&cli.config)?;
            println!("Storage Driver: {}", driver.name());
            for (key, value) in driver.status() {
                println!(" {key}: {value}");
            }
            driver.cleanup().context("driver cleanup")?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_cli_config(path: &Path) -> Result<GraphzfsConfig> {
    GraphzfsConfig::load_or_default(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn open_driver(path: &Path) -> Result<BoxedDriver> {
    let config = load_cli_config(path)?;
    let mut registry = DriverRegistry::new();
    graphzfs_zfs::register(&mut registry).context("register zfs driver")?;
    registry
        .init(&config)
        .with_context(|| format!("initialise {} driver", config.driver.name))
}
