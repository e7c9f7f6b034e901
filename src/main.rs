use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dpdc_load_pipeline::config::{
    PipelineConfig, DEFAULT_EXCEL_DIR, DEFAULT_HOLIDAY_FILE, DEFAULT_OUTPUT_DIR,
    DEFAULT_STATE_FILE, DEFAULT_WEATHER_FILE,
};
use dpdc_load_pipeline::pipeline::run_pipeline;

#[derive(Parser)]
#[command(name = "load-pipeline")]
#[command(about = "Build the DPDC master load dataset from Excel exports, holidays and weather", long_about = None)]
struct Cli {
    /// Show what would run without writing any files
    #[arg(long)]
    dry_run: bool,

    /// Regenerate every stage even if its output exists
    #[arg(long)]
    force: bool,

    /// Directory searched recursively for load workbooks
    #[arg(long, env = "DPDC_EXCEL_DIR", default_value = DEFAULT_EXCEL_DIR)]
    excel_dir: PathBuf,

    /// Holiday workbook with a 'List of Holidays' sheet
    #[arg(long, env = "DPDC_HOLIDAY_FILE", default_value = DEFAULT_HOLIDAY_FILE)]
    holiday_file: PathBuf,

    /// Hourly weather CSV produced by fetch-weather
    #[arg(long, env = "DPDC_WEATHER_FILE", default_value = DEFAULT_WEATHER_FILE)]
    weather_file: PathBuf,

    /// Directory receiving the final dataset
    #[arg(long, env = "DPDC_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Keep only load readings that fall exactly on the hour
    #[arg(long)]
    hourly_only: bool,

    /// Report data quality of the master table after the Excel merge
    #[arg(long)]
    validate: bool,

    /// Where the run record is written
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,
}

impl Cli {
    fn into_config(self) -> PipelineConfig {
        PipelineConfig {
            excel_dir: self.excel_dir,
            holiday_file: self.holiday_file,
            weather_file: self.weather_file,
            output_dir: self.output_dir,
            state_file: self.state_file,
            force: self.force,
            dry_run: self.dry_run,
            hourly_only: self.hourly_only,
            validate: self.validate,
            ..PipelineConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Cli::parse().into_config();

    match run_pipeline(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
