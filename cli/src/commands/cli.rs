use std::path::PathBuf;

use archivist_core::api::WorkerType;
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "archivist", version, about = "Archive community content through the worker process")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML config file (default: ./archivist.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log protocol traffic at debug level.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the worker, dispatch one job and follow it to the end.
    Run(RunArgs),
    /// Report the state of the worker installation.
    Check,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Root URL of the community to archive.
    #[arg(long)]
    pub root_url: String,

    /// Platform generation the community runs.
    #[arg(long, default_value_t = 4)]
    pub version: u8,

    /// messenger, topic, forum or blog.
    #[arg(long, default_value = "messenger", value_parser = parse_worker_type)]
    pub worker_type: WorkerType,
}

fn parse_worker_type(s: &str) -> Result<WorkerType, String> {
    s.parse()
}
