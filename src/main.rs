//! `disks` command-line interface.

mod commands;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use disks::config::{DEFAULT_CONFIG_FILE, DEFAULT_DISK};

#[derive(Parser)]
#[command(name = "disks", version, about = "Manage files across configured storage disks")]
struct Cli {
    /// Disk configuration file
    #[arg(short, long, global = true, env = "DISKS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Disk to operate on
    #[arg(short, long, global = true, default_value = DEFAULT_DISK)]
    disk: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List files and directories
    Ls {
        /// Directory to list (disk root if omitted)
        #[arg(default_value = "")]
        dir: String,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Only list files with this extension (repeatable)
        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,
        /// Only list directories
        #[arg(long, conflicts_with = "extensions")]
        dirs: bool,
    },
    /// Print a file to stdout
    Cat { path: String },
    /// Write a file from a local file, inline text, or stdin
    Put {
        path: String,
        /// Local file to upload
        #[arg(long, conflicts_with = "content")]
        from: Option<PathBuf>,
        /// Inline content
        #[arg(long)]
        content: Option<String>,
        /// Make the file public
        #[arg(long)]
        public: bool,
    },
    /// Delete a file
    Rm { path: String },
    /// Copy a file
    Cp { from: String, to: String },
    /// Move a file (copy, then delete the source)
    Mv { from: String, to: String },
    /// Refresh a file's modification time
    Touch { path: String },
    /// Create a directory
    Mkdir {
        path: String,
        /// Make the directory public
        #[arg(long)]
        public: bool,
    },
    /// Delete a directory and everything in it
    Rmdir { path: String },
    /// Show file metadata as JSON
    Stat { path: String },
    /// Print the public URL of a file
    Url { path: String },
    /// Validate the configuration and build every disk
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check => commands::check::execute(&cli.config),
        command => {
            let manager = commands::open_manager(&cli.config)?;
            let disk = manager.disk(&cli.disk)?;
            commands::files::execute(&disk, command).await
        },
    }
}

/// Logs go to stderr so `cat` output stays clean. `RUST_LOG` overrides
/// the default `warn` level.
fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
