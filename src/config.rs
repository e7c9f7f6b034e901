use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dhaka weather point used for every observation request
pub const DHAKA_LAT: f64 = 23.8103;
pub const DHAKA_LON: f64 = 90.4125;
pub const DHAKA_ALT_METERS: i32 = 8;

pub const DEFAULT_EXCEL_DIR: &str = "DPDC Load";
pub const DEFAULT_HOLIDAY_FILE: &str = "Holiday List.xlsx";
pub const DEFAULT_WEATHER_FILE: &str = "dhaka_weather_data.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "static";
pub const DEFAULT_MASTER_FILE: &str = "master-data.csv";
pub const DEFAULT_ENRICHED_FILE: &str = "master-data-enriched.csv";
pub const DEFAULT_MERGED_FILE: &str = "merged_master_weather.csv";
pub const FINAL_OUTPUT_FILE: &str = "master_data_with_forecasted.csv";
pub const DEFAULT_STATE_FILE: &str = "pipeline-state.json";

/// Paths and switches for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub excel_dir: PathBuf,
    pub holiday_file: PathBuf,
    pub weather_file: PathBuf,
    pub master_data_file: PathBuf,
    pub enriched_data_file: PathBuf,
    pub merged_data_file: PathBuf,
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    pub force: bool,
    pub dry_run: bool,
    pub hourly_only: bool,
    pub validate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            excel_dir: PathBuf::from(DEFAULT_EXCEL_DIR),
            holiday_file: PathBuf::from(DEFAULT_HOLIDAY_FILE),
            weather_file: PathBuf::from(DEFAULT_WEATHER_FILE),
            master_data_file: PathBuf::from(DEFAULT_MASTER_FILE),
            enriched_data_file: PathBuf::from(DEFAULT_ENRICHED_FILE),
            merged_data_file: PathBuf::from(DEFAULT_MERGED_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            force: false,
            dry_run: false,
            hourly_only: false,
            validate: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults with every intermediate and output path placed under `dir`
    pub fn rooted_at(dir: &Path) -> Self {
        let defaults = Self::default();
        Self {
            excel_dir: dir.join(defaults.excel_dir),
            holiday_file: dir.join(defaults.holiday_file),
            weather_file: dir.join(defaults.weather_file),
            master_data_file: dir.join(defaults.master_data_file),
            enriched_data_file: dir.join(defaults.enriched_data_file),
            merged_data_file: dir.join(defaults.merged_data_file),
            output_dir: dir.join(defaults.output_dir),
            state_file: dir.join(defaults.state_file),
            ..defaults
        }
    }

    pub fn final_output_file(&self) -> PathBuf {
        self.output_dir.join(FINAL_OUTPUT_FILE)
    }
}

/// Settings for the Meteostat JSON API, read from the environment
#[derive(Debug, Clone)]
pub struct WeatherApiConfig {
    pub base_url: String,
    pub api_host: String,
    pub api_key: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
    /// Maximum days per request; the hourly endpoint rejects longer ranges
    pub window_days: i64,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for WeatherApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://meteostat.p.rapidapi.com".to_string(),
            api_host: "meteostat.p.rapidapi.com".to_string(),
            api_key: None,
            latitude: DHAKA_LAT,
            longitude: DHAKA_LON,
            altitude: DHAKA_ALT_METERS,
            window_days: 30,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(4),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl WeatherApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("METEOSTAT_BASE_URL").unwrap_or(defaults.base_url),
            api_host: env::var("METEOSTAT_API_HOST").unwrap_or(defaults.api_host),
            api_key: env::var("METEOSTAT_API_KEY").ok().filter(|k| !k.is_empty()),
            max_retries: env::var("METEOSTAT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: env::var("METEOSTAT_RETRY_BASE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_base_delay),
            ..defaults
        }
    }

    /// Same settings against another server, used to point the client at a mock
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
