use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use dpdc_load_pipeline::config::{WeatherApiConfig, DEFAULT_WEATHER_FILE};
use dpdc_load_pipeline::fetcher::{write_weather_csv, WeatherFetcher};

#[derive(Parser)]
#[command(name = "fetch-weather")]
#[command(about = "Download hourly Dhaka weather from Meteostat into a CSV file", long_about = None)]
struct Cli {
    /// First day to fetch (YYYY-MM-DD)
    #[arg(long)]
    start_date: NaiveDate,

    /// Last day to fetch, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end_date: NaiveDate,

    /// Output CSV path
    #[arg(long, default_value = DEFAULT_WEATHER_FILE)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = WeatherApiConfig::from_env();
    if config.api_key.is_none() {
        warn!("METEOSTAT_API_KEY is not set, sending unauthenticated requests");
    }
    info!("Using API endpoint {}", config.base_url);

    let fetcher = WeatherFetcher::new(config)?;
    let observations = fetcher.fetch_range(cli.start_date, cli.end_date).await?;
    write_weather_csv(&cli.output, &observations)?;

    Ok(())
}
