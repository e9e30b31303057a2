use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;

use peerdrive_daemon::logging;
use peerdrive_daemon::state::{AppState, LOG_DIR_NAME};

mod cli;

use cli::op::{Op, OpContext};
use cli::ops::{Id, Init, Run, Version};

#[derive(Parser, Debug)]
#[command(name = "peerdrive", version, about = "Peer-to-peer directory sync")]
struct Cli {
    /// Directory to sync
    #[arg(long, global = true, env = "PEERDRIVE_ROOT", default_value = ".")]
    root: PathBuf,

    /// Log filter, e.g. `debug` or `common=trace` (falls back to RUST_LOG, then info)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Initialize a sync root
    Init(Init),
    /// Run the sync daemon
    Run(Run),
    /// Print this node's id
    Id(Id),
    /// Print version information
    Version(Version),
}

async fn execute<O: Op>(op: &O, ctx: &OpContext) -> anyhow::Result<()> {
    let output = op.execute(ctx).await?;
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let root = std::fs::canonicalize(&cli.root).unwrap_or(cli.root);

    // only the daemon writes log files
    let log_dir = match cli.command {
        Command::Run(_) => Some(AppState::state_dir(&root).join(LOG_DIR_NAME)).filter(|dir| dir.is_dir()),
        _ => None,
    };
    let _guard = match logging::init(cli.log_level.as_deref(), log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} failed to set up logging: {:#}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = OpContext { root };
    let result = match &cli.command {
        Command::Init(op) => execute(op, &ctx).await,
        Command::Run(op) => execute(op, &ctx).await,
        Command::Id(op) => execute(op, &ctx).await,
        Command::Version(op) => execute(op, &ctx).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
