use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod menu;
mod workspace;

#[derive(Parser)]
#[command(name = "rollcall", about = "Webcam attendance from the command line", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one recognition session and record attendance
    Attend {
        /// Print the session summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Capture a reference photo for a person
    Capture {
        /// Name to store the photo under
        name: String,
    },
    /// List V4L2 video capture devices
    Devices,
}

fn main() -> Result<()> {
    let Cli {
        config,
        verbose,
        command,
    } = Cli::parse();

    init_logging(verbose);

    let prepared = || -> Result<config::Config> {
        let cfg = config::Config::load(config.as_deref())?;
        workspace::bootstrap(&cfg)?;
        Ok(cfg)
    };

    match command {
        Some(Commands::Attend { json }) => commands::attend(&prepared()?, json),
        Some(Commands::Capture { name }) => commands::capture(&prepared()?, &name),
        Some(Commands::Devices) => commands::devices(),
        None => menu::run(&prepared()?),
    }
}

/// Events go to stderr so stdout stays clean for the menu, the preview,
/// and `--json` output.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
