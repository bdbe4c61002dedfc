use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use csv::ReaderBuilder;
use csv::Trim;
use tracing_subscriber::EnvFilter;
use wallet_ledger::command::LedgerCommand;
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::engine::TransferEngine;
use wallet_ledger::identity::UserDirectory;
use wallet_ledger::ledger::InMemoryLedgerStore;

use crate::replay::Replayer;

mod replay;
mod report;

/// Replays wallet commands through the ledger and prints the resulting balances as CSV
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// CSV of commands with columns type,user,counterparty,amount,key
    commands: PathBuf,
    /// TOML engine configuration, defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    init_tracing(&config.log_level);

    let mut commands_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(&args.commands)?;

    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = TransferEngine::new(store, config);
    let directory = UserDirectory::new();
    let mut replayer = Replayer::new(&engine, &directory);

    let mut failures = 0_usize;
    for (index, command_res) in commands_reader.deserialize::<LedgerCommand>().enumerate() {
        let row = index + 1;
        let command = match command_res {
            Ok(command) => command,
            Err(error) => {
                eprintln!("failed to deserialize command, row={row}, error={error}");
                failures += 1;
                continue;
            }
        };

        if let Err(error) = replayer.apply(row, &command).await {
            eprintln!("error applying command, row={row}, command=({command}), error={error}");
            failures += 1;
        }
    }

    report::write_to_stdout(&engine, replayer.users()).await?;

    if failures > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(fallback_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
