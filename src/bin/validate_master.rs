use clap::Parser;
use std::path::PathBuf;

use dpdc_load_pipeline::config::DEFAULT_MASTER_FILE;
use dpdc_load_pipeline::validator::validate_master;

#[derive(Parser)]
#[command(name = "validate-master")]
#[command(about = "Check a master load table for duplicate, missing and malformed rows", long_about = None)]
struct Cli {
    /// Master table to check
    #[arg(default_value = DEFAULT_MASTER_FILE)]
    path: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    println!("Checking {}...\n", cli.path.display());

    let report = validate_master(&cli.path)?;
    println!("{report}");

    Ok(())
}
