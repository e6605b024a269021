//! # Gatework CLI Module
//!
//! This module implements the CLI interface for Gatework.
//!
//! ## Available Commands
//!
//! - `init` - Create a new scene file
//! - `info` - Summarize a scene file
//! - `convert` - Re-encode a scene file (JSON <-> binary)
//! - `simulate` - Set inputs, run clock ticks and print outputs
//! - `truth-table` - Evaluate a component for every input combination
//! - `publish` - Store a component scene in the library
//! - `deps` - List and resolve a scene's dependencies
//! - `hash` - Compute the BLAKE3 hash of a scene's binary encoding

mod commands;

use crate::config::{Config, FileFormat, StoreKind};
use clap::{Parser, Subcommand};
use gatework_core::GateworkError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Gatework - logic circuit simulator
///
/// Builds, inspects and simulates gate-level scenes, and manages the
/// library of reusable components they depend on.
#[derive(Parser, Debug)]
#[command(name = "gatework")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Component library directory (overrides the config file)
    #[arg(short = 'L', long, global = true)]
    pub library: Option<PathBuf>,

    /// Component store backend (overrides the config file)
    #[arg(short = 'S', long, global = true, value_enum)]
    pub store: Option<StoreKind>,

    /// Path to a gatework.toml config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new, empty scene file
    Init {
        /// Scene file to create
        path: PathBuf,

        /// Scene name
        #[arg(short, long)]
        name: Option<String>,

        /// Make it a component with this many boundary inputs
        #[arg(long)]
        inputs: Option<u8>,

        /// Boundary outputs of the component
        #[arg(long)]
        outputs: Option<u8>,

        /// Encoding (defaults to the extension, then the config file)
        #[arg(short = 't', long, value_enum)]
        format: Option<FileFormat>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show a summary of a scene file
    Info {
        /// Scene file
        path: PathBuf,
    },

    /// Re-encode a scene file
    Convert {
        /// Source scene file (either encoding)
        input: PathBuf,

        /// Destination file
        output: PathBuf,

        /// Encoding (defaults to the extension, then the config file)
        #[arg(short = 't', long, value_enum)]
        format: Option<FileFormat>,
    },

    /// Drive inputs, run clock ticks and print output values
    Simulate {
        /// Scene file
        path: PathBuf,

        /// Input assignments as SLOT=0|1 (repeatable)
        #[arg(short = 's', long = "set", value_name = "SLOT=VALUE")]
        assignments: Vec<String>,

        /// Clock ticks to run after the inputs are set
        #[arg(short, long, default_value = "0")]
        ticks: u64,

        /// Write the resulting input values back to the file
        #[arg(long)]
        save: bool,
    },

    /// Print the truth table of a component scene
    TruthTable {
        /// Component scene file
        path: PathBuf,
    },

    /// Store a component scene in the library
    Publish {
        /// Component scene file
        path: PathBuf,

        /// Dependency key, e.g. local/adder/1 or alice/adder/2
        key: String,
    },

    /// List a scene's dependencies and whether they resolve
    Deps {
        /// Scene file
        path: PathBuf,
    },

    /// Compute BLAKE3 hash of a scene's binary encoding
    Hash {
        /// Scene file
        path: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub json_mode: bool,
}

impl Context {
    /// Merge the config file with command-line overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self, GateworkError> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(library) = &cli.library {
            config.library_dir.clone_from(library);
        }
        if let Some(store) = cli.store {
            config.store = store;
        }
        Ok(Self {
            config,
            json_mode: cli.json_mode,
        })
    }
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), GateworkError> {
    let ctx = Context::from_cli(&cli)?;
    tracing::debug!(
        "library {} ({:?})",
        ctx.config.library_dir.display(),
        ctx.config.store
    );

    match cli.command {
        Commands::Init {
            path,
            name,
            inputs,
            outputs,
            format,
            force,
        } => cmd_init(&ctx, &path, name, inputs, outputs, format, force),
        Commands::Info { path } => cmd_info(&ctx, &path),
        Commands::Convert {
            input,
            output,
            format,
        } => cmd_convert(&ctx, &input, &output, format),
        Commands::Simulate {
            path,
            assignments,
            ticks,
            save,
        } => cmd_simulate(&ctx, &path, &assignments, ticks, save),
        Commands::TruthTable { path } => cmd_truth_table(&ctx, &path),
        Commands::Publish { path, key } => cmd_publish(&ctx, &path, &key),
        Commands::Deps { path } => cmd_deps(&ctx, &path),
        Commands::Hash { path } => cmd_hash(&ctx, &path),
    }
}
