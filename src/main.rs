mod cli;
mod clock;
mod config;
mod db;
mod error;
mod ledger;
mod types;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli_opts = cli::Cli::parse();
    let config = match &cli_opts.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let gateway = db::open(&config.storage)?;
    let mut ledger = ledger::Ledger::load(
        gateway,
        Box::new(clock::SystemClock),
        config.persistence.clone(),
    )?;

    cli::run(cli_opts.command.unwrap_or(cli::Command::Status), &mut ledger)
}
