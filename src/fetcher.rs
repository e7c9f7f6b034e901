use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::WeatherApiConfig;
use crate::fetch_error::FetchError;
use crate::table::Table;
use crate::timestamp::{dhaka_offset, format_timestamp};

/// Columns of the weather file, in order
pub const WEATHER_COLUMNS: [&str; 9] = [
    "date_time", "temp", "dwpt", "rhum", "prcp", "wdir", "wspd", "pres", "coco",
];

/// Raw hourly record as returned by the Meteostat point endpoint (times in UTC)
#[derive(Debug, Clone, Deserialize)]
struct ApiObservation {
    time: String,
    temp: Option<f64>,
    dwpt: Option<f64>,
    rhum: Option<f64>,
    prcp: Option<f64>,
    wdir: Option<f64>,
    wspd: Option<f64>,
    pres: Option<f64>,
    coco: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Vec<ApiObservation>,
}

/// One hourly observation, already shifted to the Dhaka offset
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub date_time: DateTime<FixedOffset>,
    pub temp: Option<f64>,
    pub dwpt: Option<f64>,
    pub rhum: Option<f64>,
    pub prcp: Option<f64>,
    pub wdir: Option<f64>,
    pub wspd: Option<f64>,
    pub pres: Option<f64>,
    pub coco: Option<f64>,
}

impl WeatherObservation {
    /// Measurement values in `WEATHER_COLUMNS` order (after `date_time`)
    pub fn values(&self) -> [Option<f64>; 8] {
        [
            self.temp, self.dwpt, self.rhum, self.prcp, self.wdir, self.wspd, self.pres, self.coco,
        ]
    }
}

#[derive(Clone)]
pub struct WeatherFetcher {
    client: reqwest::Client,
    config: WeatherApiConfig,
}

impl WeatherFetcher {
    pub fn new(config: WeatherApiConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch every hourly observation between two dates, inclusive
    ///
    /// The range is requested in windows of `window_days`; each window is
    /// retried with exponential backoff. A window that stays empty after all
    /// retries is logged and skipped, but an entirely empty range is an error.
    #[instrument(skip(self))]
    pub async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeatherObservation>, FetchError> {
        if start > end {
            return Err(FetchError::InvalidRange { start, end });
        }

        info!(
            "Fetching weather for lat={}, lon={}, alt={}m from {} to {}",
            self.config.latitude, self.config.longitude, self.config.altitude, start, end
        );

        let mut observations = Vec::new();
        for (window_start, window_end) in date_windows(start, end, self.config.window_days) {
            let fetch = move || self.fetch_window(window_start, window_end);
            let result = fetch
                .retry(self.backoff())
                .when(FetchError::is_retryable)
                .notify(|err: &FetchError, delay: Duration| {
                    warn!("Weather request failed: {}. Retrying in {:?}", err, delay);
                })
                .await;

            match result {
                Ok(mut window) => {
                    debug!(
                        "Window {} to {}: {} observations",
                        window_start,
                        window_end,
                        window.len()
                    );
                    observations.append(&mut window);
                }
                Err(FetchError::EmptyResponse { start, end }) => {
                    warn!("No weather data for {} to {}, continuing", start, end);
                }
                Err(e) => return Err(e),
            }
        }

        if observations.is_empty() {
            return Err(FetchError::EmptyResponse { start, end });
        }

        observations.sort_by_key(|o| o.date_time);
        info!("Retrieved {} hourly records", observations.len());
        Ok(observations)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.retry_base_delay)
            .with_factor(2.0)
            .with_max_times(self.config.max_retries)
    }

    async fn fetch_window(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeatherObservation>, FetchError> {
        let url = format!("{}/point/hourly", self.config.base_url.trim_end_matches('/'));
        debug!("Requesting {} for {} to {}", url, start, end);

        let mut request = self.client.get(&url).query(&[
            ("lat", self.config.latitude.to_string()),
            ("lon", self.config.longitude.to_string()),
            ("alt", self.config.altitude.to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
        ]);
        if let Some(key) = &self.config.api_key {
            request = request
                .header("x-rapidapi-key", key)
                .header("x-rapidapi-host", &self.config.api_host);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if status.is_server_error() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let observations = parse_response(&body)?;
        if observations.is_empty() {
            return Err(FetchError::EmptyResponse { start, end });
        }
        Ok(observations)
    }
}

/// Split an inclusive date range into consecutive windows of at most `days` days
pub fn date_windows(start: NaiveDate, end: NaiveDate, days: i64) -> Vec<(NaiveDate, NaiveDate)> {
    let span = ChronoDuration::days(days.max(1) - 1);
    let mut windows = Vec::new();
    let mut window_start = start;

    while window_start <= end {
        let window_end = (window_start + span).min(end);
        windows.push((window_start, window_end));
        window_start = window_end + ChronoDuration::days(1);
    }

    windows
}

fn parse_response(body: &str) -> Result<Vec<WeatherObservation>, FetchError> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    response
        .data
        .into_iter()
        .map(|raw| {
            let naive = NaiveDateTime::parse_from_str(&raw.time, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| FetchError::DateTimeError(format!("{}: {e}", raw.time)))?;
            let date_time =
                DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).with_timezone(&dhaka_offset());

            Ok(WeatherObservation {
                date_time,
                temp: raw.temp,
                dwpt: raw.dwpt,
                rhum: raw.rhum,
                prcp: raw.prcp,
                wdir: raw.wdir,
                wspd: raw.wspd,
                pres: raw.pres,
                coco: raw.coco,
            })
        })
        .collect()
}

/// Build the weather table; missing measurements are written as empty cells
pub fn observations_to_table(observations: &[WeatherObservation]) -> Table {
    let mut table = Table::new(WEATHER_COLUMNS.iter().map(|c| c.to_string()).collect());
    for obs in observations {
        let mut row = Vec::with_capacity(WEATHER_COLUMNS.len());
        row.push(format_timestamp(&obs.date_time));
        row.extend(
            obs.values()
                .iter()
                .map(|v| v.map(|f| f.to_string()).unwrap_or_default()),
        );
        table.rows.push(row);
    }
    table
}

/// Write observations to `path` atomically and log a short summary
pub fn write_weather_csv(path: &Path, observations: &[WeatherObservation]) -> Result<(), FetchError> {
    let table = observations_to_table(observations);
    table.write_csv(path)?;

    info!("Data saved to: {}", path.display());
    info!("Total records: {}", table.len());
    if let (Some(first), Some(last)) = (observations.first(), observations.last()) {
        info!(
            "Date range: {} to {}",
            format_timestamp(&first.date_time),
            format_timestamp(&last.date_time)
        );
    }

    for (idx, column) in WEATHER_COLUMNS.iter().enumerate().skip(1) {
        let missing = observations
            .iter()
            .filter(|o| o.values()[idx - 1].is_none())
            .count();
        if missing > 0 {
            info!(
                "Missing values in {}: {} ({:.1}%)",
                column,
                missing,
                missing as f64 * 100.0 / observations.len() as f64
            );
        }
    }

    Ok(())
}
