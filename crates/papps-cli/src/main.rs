use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod completion;
mod context;
mod dispatch;
mod render;

use completion::CliCompletionShell;
use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "papps")]
#[command(about = "Portable application manager", long_about = None)]
struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Log every step as it runs.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Accept license agreements without asking.
    #[arg(short = 'y', long, global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install or upgrade the application described by a manifest URL.
    Install { url: String },
    /// Remove an installed application and its shortcuts.
    Remove { url: String },
    /// List installed applications.
    List,
    /// Check for newer releases of the installed applications.
    Updates {
        /// Install every available update.
        #[arg(long)]
        apply: bool,
        /// Check even when the update interval has not elapsed.
        #[arg(long)]
        force: bool,
        /// Update service to ask instead of the configured one.
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Put back installations left behind by an interrupted upgrade.
    Repair,
    Shortcuts {
        #[command(subcommand)]
        command: ShortcutCommands,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Print a shell completion script.
    Completions { shell: Option<CliCompletionShell> },
    Version,
}

#[derive(Subcommand, Debug)]
enum ShortcutCommands {
    List,
    /// Remove every shortcut and the start menu folder.
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    Show,
    SetBaseDir { path: PathBuf },
    /// Hours between automatic update checks (minimum 3).
    SetInterval { hours: u64 },
    SetEndpoint { url: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_cli(cli)
}

fn init_tracing(verbose: bool) {
    let level_filter = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("PAPPS_LOG")
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
}
