// src/bin/seed_raw.rs
// Load the raw nominations CSV into the database the pipeline extracts from.

use anyhow::Result;
use awardsetl::{config::Config, load::load_raw_data, table::read_csv};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
struct Args {
    /// Raw nominations CSV
    #[arg(long, default_value = "./data/the_grammy_awards.csv")]
    csv: PathBuf,

    /// Target table; defaults to NOMINATIONS_TABLE
    #[arg(long)]
    table: Option<String>,
}

fn main() -> Result<()> {
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let cfg = Config::from_env()?;
    let table_name = args.table.unwrap_or(cfg.nominations_table);

    let raw = read_csv(&args.csv)?;
    info!(csv = %args.csv.display(), rows = raw.num_rows(), "raw dataset read");
    let rows = load_raw_data(&cfg.db, &raw, &table_name)?;
    info!(table = %table_name, rows, "raw table seeded");
    Ok(())
}
