use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use p2p_ledger::{LedgerConfig, bin_utils::Service};
use tracing_subscriber::EnvFilter;

/// Runs a CSV script of `open`, `transfer` and `history` operations against an
/// in memory ledger and answers every row with a JSON line on stdout.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// CSV file with columns `type,user,recipient,amount,name,attempt`.
    input: PathBuf,

    /// JSON file with ledger settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the final balance sheet as CSV.
    #[arg(long)]
    balances: Option<PathBuf>,

    /// Overrides `max_transfer_attempts`.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Overrides `history_limit_per_role`.
    #[arg(long)]
    history_limit: Option<usize>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let mut config = match &args.config {
        Some(path) => LedgerConfig::from_file(path)
            .with_context(|| format!("Failed to load config `{}`", path.display()))?,
        None => LedgerConfig::default(),
    };
    if let Some(max_attempts) = args.max_attempts {
        config.max_transfer_attempts = max_attempts;
    }
    if let Some(history_limit) = args.history_limit {
        config.history_limit_per_role = history_limit;
    }
    let config = config.validate()?;

    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open `{}`", args.input.display()))?;
    let mut balances: Box<dyn Write> = match &args.balances {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create `{}`", path.display()))?,
        ),
        None => Box::new(io::sink()),
    };

    let service = Service {
        input: file,
        responses: &mut io::stdout(),
        balances: &mut balances,
        config,
        error_printer: Box::new(|line, err| {
            tracing::error!("Error at line {line}: {err}");
        }),
    };
    service.run()
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("p2p_ledger={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
