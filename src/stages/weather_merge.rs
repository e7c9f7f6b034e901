use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use super::{StageError, StageStats};
use crate::table::Table;
use crate::timestamp::{format_timestamp, parse_timestamp};

/// Column layout of the merged master table consumed by the forecaster
pub const OUTPUT_COLUMNS: [&str; 14] = [
    "date_time",
    "load",
    "is_holiday",
    "holiday_type",
    "national_event_type",
    "temp",
    "dwpt",
    "rhum",
    "prcp",
    "wdir",
    "wspd",
    "pres",
    "coco",
    "forecasted_load",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherMergeStats {
    pub rows: usize,
    pub matched_rows: usize,
    pub columns: usize,
    pub missing_columns: Vec<String>,
    pub extra_columns: Vec<String>,
    pub skipped_weather_rows: usize,
}

impl From<WeatherMergeStats> for StageStats {
    fn from(stats: WeatherMergeStats) -> Self {
        StageStats {
            rows: Some(stats.rows),
            summary: format!(
                "{} of {} rows matched a weather observation, {} columns",
                stats.matched_rows, stats.rows, stats.columns
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnSource {
    Master(usize),
    Weather(usize),
    Missing,
}

/// Left-join the enriched master table with the weather file on `date_time`
///
/// Every master row is kept exactly once; rows without a weather observation
/// at the same instant get empty weather cells.
#[instrument(skip_all, fields(master = %master.display(), weather = %weather.display()))]
pub fn merge_weather(
    master: &Path,
    weather: &Path,
    output: &Path,
) -> Result<WeatherMergeStats, StageError> {
    for input in [master, weather] {
        if !input.is_file() {
            return Err(StageError::MissingFile(input.to_path_buf()));
        }
    }

    info!("Reading {}", master.display());
    let master_table = Table::read_csv(master)?;
    info!("Reading {}", weather.display());
    let weather_table = Table::read_csv(weather)?;

    let (merged, stats) = join_tables(&master_table, master, &weather_table, weather)?;

    info!("Saving to {}", output.display());
    merged.write_csv(output)?;
    info!(
        total_rows = stats.rows,
        matched_rows = stats.matched_rows,
        columns = stats.columns,
        "Created {}",
        output.display()
    );
    Ok(stats)
}

/// Pure join used by `merge_weather`
pub fn join_tables(
    master: &Table,
    master_path: &Path,
    weather: &Table,
    weather_path: &Path,
) -> Result<(Table, WeatherMergeStats), StageError> {
    let master_ts = master.require_column("date_time", master_path)?;
    let weather_ts = weather.require_column("date_time", weather_path)?;

    let mut stats = WeatherMergeStats::default();

    let (sources, headers) = plan_columns(master, weather, &mut stats);
    log_column_check(&stats);

    let index = index_weather(weather, weather_ts, weather_path, &mut stats);

    let mut merged = Table::new(headers);
    for (i, row) in master.rows.iter().enumerate() {
        let ts = parse_timestamp(&row[master_ts]).map_err(|_| StageError::InvalidTimestamp {
            path: master_path.to_path_buf(),
            row: i + 2,
            value: row[master_ts].clone(),
        })?;

        let weather_row = index.get(&ts).map(|&idx| &weather.rows[idx]);
        if weather_row.is_some() {
            stats.matched_rows += 1;
        }

        let mut out = Vec::with_capacity(sources.len() + 1);
        out.push(format_timestamp(&ts));
        for source in &sources {
            out.push(match source {
                ColumnSource::Master(idx) => row[*idx].clone(),
                ColumnSource::Weather(idx) => weather_row.map(|w| w[*idx].clone()).unwrap_or_default(),
                ColumnSource::Missing => String::new(),
            });
        }
        merged.rows.push(out);
    }

    stats.rows = merged.len();
    stats.columns = merged.headers.len();
    Ok((merged, stats))
}

/// Decide where each output column (after `date_time`) comes from
fn plan_columns(
    master: &Table,
    weather: &Table,
    stats: &mut WeatherMergeStats,
) -> (Vec<ColumnSource>, Vec<String>) {
    let mut sources = Vec::new();
    let mut headers = vec!["date_time".to_string()];

    for column in OUTPUT_COLUMNS.iter().skip(1) {
        let source = match (master.column_index(column), weather.column_index(column)) {
            (Some(idx), _) => ColumnSource::Master(idx),
            (None, Some(idx)) => ColumnSource::Weather(idx),
            (None, None) => {
                stats.missing_columns.push(column.to_string());
                ColumnSource::Missing
            }
        };
        sources.push(source);
        headers.push(column.to_string());
    }

    // Anything unexpected is carried along after the fixed layout
    let mut seen: Vec<&str> = OUTPUT_COLUMNS.to_vec();
    for (table, is_master) in [(master, true), (weather, false)] {
        for (idx, column) in table.headers.iter().enumerate() {
            if seen.contains(&column.as_str()) {
                continue;
            }
            seen.push(column.as_str());
            stats.extra_columns.push(column.clone());
            headers.push(column.clone());
            sources.push(if is_master {
                ColumnSource::Master(idx)
            } else {
                ColumnSource::Weather(idx)
            });
        }
    }

    (sources, headers)
}

fn log_column_check(stats: &WeatherMergeStats) {
    if !stats.missing_columns.is_empty() {
        warn!(
            "Missing expected columns: {}",
            stats.missing_columns.join(", ")
        );
    }
    if !stats.extra_columns.is_empty() {
        warn!("Extra columns found: {}", stats.extra_columns.join(", "));
    }
    if stats.missing_columns.is_empty() && stats.extra_columns.is_empty() {
        info!("All expected columns found");
    }
}

/// Map each weather instant to its first row; unreadable rows are skipped
fn index_weather(
    weather: &Table,
    ts_idx: usize,
    path: &Path,
    stats: &mut WeatherMergeStats,
) -> HashMap<DateTime<FixedOffset>, usize> {
    let mut index = HashMap::with_capacity(weather.len());
    let mut duplicates = 0;

    for (i, row) in weather.rows.iter().enumerate() {
        match parse_timestamp(&row[ts_idx]) {
            Ok(ts) => {
                if index.contains_key(&ts) {
                    duplicates += 1;
                    debug!("Duplicate weather timestamp {}, keeping first", row[ts_idx]);
                } else {
                    index.insert(ts, i);
                }
            }
            Err(_) => {
                warn!(
                    "Skipping weather row {} in {}: bad timestamp '{}'",
                    i + 2,
                    path.display(),
                    row[ts_idx]
                );
                stats.skipped_weather_rows += 1;
            }
        }
    }

    if duplicates > 0 {
        warn!("Ignored {} duplicate weather timestamps", duplicates);
    }
    index
}
