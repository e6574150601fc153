use clap::Parser;

mod commands;
mod logging;
mod render;

use archivist_core::api as core_api;
use commands::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    let cfg = core_api::load_from(args.config.as_deref())?;
    let guard = logging::init(&cfg.logging, args.verbose)?;

    let code = match args.command {
        cli::Commands::Run(run_args) => commands::run::run(cfg, run_args).await?,
        cli::Commands::Check => commands::check::check(&cfg),
    };

    drop(guard);
    std::process::exit(code);
}
