//! `blossom` command-line client.

mod app;
mod config;
mod signer;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blossom")]
#[command(about = "Upload, mirror and locate content-addressed blobs on Blossom servers")]
#[command(version)]
struct Cli {
    /// Config file path (default: $XDG_CONFIG_HOME/blossom/config.toml)
    #[arg(long, global = true, env = "BLOSSOM_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging for blossom crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ServerArgs {
    /// Server URL (repeatable; overrides the config file)
    #[arg(long = "server")]
    pub servers: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file to every upload server, then mirror it
    Upload {
        file: PathBuf,

        /// MIME type (default: guessed from the file extension)
        #[arg(long)]
        mime: Option<String>,

        /// Never fall back to a single PUT
        #[arg(long)]
        strict: bool,

        /// Skip mirroring after upload
        #[arg(long)]
        no_mirror: bool,

        #[command(flatten)]
        servers: ServerArgs,
    },
    /// Mirror an existing blob descriptor (JSON file) to mirror servers
    Mirror {
        descriptor: PathBuf,

        #[command(flatten)]
        servers: ServerArgs,
    },
    /// Print the ordered retrieval URLs for a blob
    Resolve {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Blob hash, when the URLs are not content-addressed
        #[arg(long)]
        sha256: Option<String>,

        /// Author public key passed to proxies
        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,
    },
    /// Probe which servers hold a blob
    Check {
        sha256: String,

        /// File extension used in probe URLs
        #[arg(long)]
        ext: Option<String>,

        #[command(flatten)]
        servers: ServerArgs,
    },
    /// Exit 0 if any server holds the blob, 1 otherwise
    Exists {
        sha256: String,

        #[command(flatten)]
        servers: ServerArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,blossom=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    let found = rt.block_on(app::run(cli.command, config))?;
    if !found {
        std::process::exit(1);
    }
    Ok(())
}
