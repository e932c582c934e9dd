//! Revcall CLI - demo runtime and echo processor for reverse-call streams.

mod commands;
mod protocol;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "revcall")]
#[command(author, version, about = "Revcall - reverse-call client engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default revcall.toml
    Init {
        /// Project directory (default: current directory)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Run a demo runtime that pushes requests to connected processors
    Serve {
        /// Address to accept reverse-call streams on
        #[arg(short, long, default_value = "127.0.0.1:50053")]
        addr: String,

        /// Also serve the handshake on this address
        #[arg(long)]
        handshake_addr: Option<String>,

        /// Milliseconds between pushed requests
        #[arg(short, long, default_value = "1000")]
        request_interval_ms: u64,
    },

    /// Register an echo processor with a runtime and serve it until ctrl-c
    Register {
        /// Config file (default: revcall.toml in the current or a parent directory)
        #[arg(short, long)]
        config: Option<String>,

        /// Runtime address, overriding the config file
        #[arg(short, long)]
        addr: Option<String>,

        /// Handshake address, overriding the config file
        #[arg(long)]
        handshake_addr: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { path } => commands::init::run(path),
        Commands::Serve {
            addr,
            handshake_addr,
            request_interval_ms,
        } => commands::serve::run(&addr, handshake_addr.as_deref(), request_interval_ms),
        Commands::Register {
            config,
            addr,
            handshake_addr,
        } => commands::register::run(config.as_deref(), addr, handshake_addr),
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
