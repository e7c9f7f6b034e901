use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument};

use super::{StageError, StageStats};
use crate::importers::HolidayWorkbook;
use crate::table::Table;
use crate::timestamp::{format_timestamp, parse_timestamp};

/// Columns added by enrichment, in output order
pub const HOLIDAY_COLUMNS: [&str; 3] = ["is_holiday", "holiday_type", "national_event_type"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub holidays_listed: usize,
    pub rows: usize,
    pub holiday_rows: usize,
}

impl From<EnrichStats> for StageStats {
    fn from(stats: EnrichStats) -> Self {
        StageStats {
            rows: Some(stats.rows),
            summary: format!(
                "{} holiday rows from {} listed holidays",
                stats.holiday_rows, stats.holidays_listed
            ),
        }
    }
}

/// Add holiday flags to every row of the master table
///
/// `is_holiday` is 1 when the row's calendar date (Dhaka time) is in the
/// holiday list, `holiday_type` carries the list's type code (0 otherwise) and
/// `national_event_type` is reserved and always 0.
#[instrument(skip_all, fields(master = %master.display(), holidays = %holiday_file.display()))]
pub fn enrich_with_holidays(
    master: &Path,
    holiday_file: &Path,
    output: &Path,
) -> Result<EnrichStats, StageError> {
    if !holiday_file.is_file() {
        return Err(StageError::MissingFile(holiday_file.to_path_buf()));
    }
    if !master.is_file() {
        return Err(StageError::MissingFile(master.to_path_buf()));
    }

    info!("Reading {}", holiday_file.display());
    let calendar = HolidayWorkbook::new(holiday_file).holiday_calendar()?;

    info!("Reading {}", master.display());
    let table = Table::read_csv(master)?;

    let (enriched, holiday_rows) = apply_calendar(table, &calendar, master)?;

    info!("Saving to {}", output.display());
    enriched.write_csv(output)?;

    let stats = EnrichStats {
        holidays_listed: calendar.len(),
        rows: enriched.len(),
        holiday_rows,
    };
    info!(
        total_rows = stats.rows,
        holiday_rows = stats.holiday_rows,
        non_holiday_rows = stats.rows - stats.holiday_rows,
        "Created {}",
        output.display()
    );
    Ok(stats)
}

/// Append (or overwrite) the holiday columns; returns the table and the flagged row count
pub fn apply_calendar(
    mut table: Table,
    calendar: &BTreeMap<NaiveDate, i64>,
    source: &Path,
) -> Result<(Table, usize), StageError> {
    let date_idx = table.require_column("date_time", source)?;

    let column_idx: Vec<usize> = HOLIDAY_COLUMNS
        .iter()
        .map(|name| match table.column_index(name) {
            Some(idx) => idx,
            None => {
                table.headers.push(name.to_string());
                table.headers.len() - 1
            }
        })
        .collect();
    let width = table.headers.len();

    let mut holiday_rows = 0;
    for (i, row) in table.rows.iter_mut().enumerate() {
        let ts = parse_timestamp(&row[date_idx]).map_err(|_| StageError::InvalidTimestamp {
            path: source.to_path_buf(),
            row: i + 2,
            value: row[date_idx].clone(),
        })?;
        row.resize(width, String::new());
        row[date_idx] = format_timestamp(&ts);

        let holiday_type = calendar.get(&ts.date_naive()).copied();
        if holiday_type.is_some() {
            holiday_rows += 1;
        }

        row[column_idx[0]] = if holiday_type.is_some() { "1" } else { "0" }.to_string();
        row[column_idx[1]] = holiday_type.unwrap_or(0).to_string();
        row[column_idx[2]] = "0".to_string();
    }

    Ok((table, holiday_rows))
}
