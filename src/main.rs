mod cli_logger;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use bootgraph::{BootArgs, Config, TraceArgs, boot_command, trace_command};

use crate::cli_logger::CliLogger;

/// Kernel boot timeline from initcall_debug console logs and ftrace output.
#[derive(Debug, Parser)]
#[command(name = "bootgraph", version)]
struct Cli {
    /// Config file; missing files fall back to defaults.
    #[arg(long, global = true, default_value = "bootgraph.toml")]
    config: PathBuf,
    /// Print machine-readable json instead of the text summary.
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initcall timeline from a dmesg log, optionally with call graphs.
    Boot(BootArgs),
    /// Wakeup source, wakelock, cpu idle and cpu frequency timeline from ftrace.
    Trace(TraceArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let logger = CliLogger::new(cli.json, cli.no_color);
    match run(&cli, &logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            logger.print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, logger: &CliLogger) -> anyhow::Result<()> {
    let config = Config::load_optional(&cli.config);
    let summary = match &cli.command {
        Command::Boot(args) => boot_command(&config, args)?,
        Command::Trace(args) => trace_command(&config, args)?,
    };
    logger.print_run_summary(&summary)
}
