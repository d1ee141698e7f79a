mod commands;
mod prefix;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Result;
use cellar_argparse::SystemInfo;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use crate::prefix::FsBackend;

#[derive(Parser)]
#[command(name = "cellar")]
#[command(version, about = "Install formulae and casks into a cellar prefix", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Installation prefix holding Cellar, Caskroom and Library/Taps
    #[arg(long, env = "CELLAR_PREFIX", default_value = "/opt/cellar", value_name = "DIR")]
    prefix: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Any built-in command; see `cellar commands`
    #[command(external_subcommand)]
    External(Vec<String>),
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let Commands::External(argv) = cli.command;
    let Some((name, rest)) = argv.split_first() else {
        return Ok(ExitCode::FAILURE);
    };

    let backend = Rc::new(FsBackend::new(cli.prefix));
    match commands::dispatch(name, rest, backend, system()) {
        Ok(code) => Ok(ExitCode::from(code)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_tracing() {
    let default = if env_flag("CELLAR_DEBUG") { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .compact()
        .init();
}

/// The system commands validate against. Linux hosts can opt into macOS
/// behaviour, which re-enables casks.
fn system() -> SystemInfo {
    if env_flag("CELLAR_SIMULATE_MACOS_ON_LINUX") {
        SystemInfo::simulated_macos()
    } else {
        SystemInfo::current()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty())
}
