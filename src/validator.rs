// Read-only consistency report over a master table
//
// Findings are advisory: only an unreadable file (or one without a
// `date_time` column) is an error.

use chrono::{DateTime, Duration, FixedOffset};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::table::{Table, TableError};
use crate::timestamp::{format_timestamp, parse_timestamp};

/// Value columns checked for empty, non-numeric or negative cells
pub const VALUE_COLUMNS: [&str; 2] = ["load", "forecasted_load"];

/// Gaps listed in the report; the total is always counted
pub const MAX_LISTED_GAPS: usize = 50;

const MAX_LISTED_ROWS: usize = 20;

/// Shortest sampling interval, in seconds, the grid is inferred at
const MIN_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateTimestamp {
    pub timestamp: DateTime<FixedOffset>,
    pub count: usize,
    /// CSV line numbers (header is line 1)
    pub lines: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueProblem {
    Empty,
    NonNumeric,
    Negative,
}

impl fmt::Display for ValueProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueProblem::Empty => write!(f, "empty"),
            ValueProblem::NonNumeric => write!(f, "non-numeric"),
            ValueProblem::Negative => write!(f, "negative"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueIssue {
    pub line: usize,
    pub column: String,
    pub value: String,
    pub problem: ValueProblem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub total_rows: usize,
    pub first_timestamp: Option<DateTime<FixedOffset>>,
    pub last_timestamp: Option<DateTime<FixedOffset>>,
    /// Line number and raw cell of every unparseable timestamp
    pub invalid_timestamps: Vec<(usize, String)>,
    pub duplicates: Vec<DuplicateTimestamp>,
    pub interval: Duration,
    pub missing_slot_count: usize,
    /// First `MAX_LISTED_GAPS` missing slots
    pub missing_slots: Vec<DateTime<FixedOffset>>,
    /// Line numbers of timestamps not on the `interval` grid
    pub off_grid_lines: Vec<usize>,
    pub missing_value_columns: Vec<String>,
    pub value_issues: Vec<ValueIssue>,
}

impl ValidationReport {
    pub fn issues_found(&self) -> bool {
        !self.invalid_timestamps.is_empty()
            || !self.duplicates.is_empty()
            || self.missing_slot_count > 0
            || !self.off_grid_lines.is_empty()
            || !self.missing_value_columns.is_empty()
            || !self.value_issues.is_empty()
    }

    /// Rows sharing a timestamp beyond the first occurrence
    pub fn duplicate_rows(&self) -> usize {
        self.duplicates.iter().map(|d| d.count - 1).sum()
    }

    /// Log a one-line summary; used by the pipeline after the Excel stage
    pub fn log_summary(&self) {
        info!(
            rows = self.total_rows,
            invalid_timestamps = self.invalid_timestamps.len(),
            duplicate_rows = self.duplicate_rows(),
            missing_slots = self.missing_slot_count,
            off_grid = self.off_grid_lines.len(),
            value_issues = self.value_issues.len(),
            "Validated {}",
            self.path.display()
        );
    }
}

/// Read `path` and check it for timestamp and value problems
#[instrument(skip_all, fields(path = %path.display()))]
pub fn validate_master(path: &Path) -> Result<ValidationReport, TableError> {
    let table = Table::read_csv(path)?;
    check_table(&table, path)
}

/// Same checks over an already loaded table
pub fn check_table(table: &Table, path: &Path) -> Result<ValidationReport, TableError> {
    let ts_idx = table.require_column("date_time", path)?;

    let mut invalid_timestamps = Vec::new();
    let mut parsed: Vec<(usize, DateTime<FixedOffset>)> = Vec::with_capacity(table.len());
    for (i, row) in table.rows.iter().enumerate() {
        let line = i + 2;
        match parse_timestamp(&row[ts_idx]) {
            Ok(ts) => parsed.push((line, ts)),
            Err(_) => invalid_timestamps.push((line, row[ts_idx].clone())),
        }
    }

    let mut occurrences: BTreeMap<DateTime<FixedOffset>, Vec<usize>> = BTreeMap::new();
    for (line, ts) in &parsed {
        occurrences.entry(*ts).or_default().push(*line);
    }

    let duplicates = occurrences
        .iter()
        .filter(|(_, lines)| lines.len() > 1)
        .map(|(ts, lines)| DuplicateTimestamp {
            timestamp: *ts,
            count: lines.len(),
            lines: lines.clone(),
        })
        .collect();

    let distinct: Vec<DateTime<FixedOffset>> = occurrences.keys().copied().collect();
    let interval = infer_interval(&distinct);
    let first_timestamp = distinct.first().copied();
    let last_timestamp = distinct.last().copied();

    let (missing_slot_count, missing_slots) = find_gaps(&distinct, interval);

    let off_grid_lines = match first_timestamp {
        Some(first) => parsed
            .iter()
            .filter(|(_, ts)| !on_grid(first, *ts, interval))
            .map(|(line, _)| *line)
            .collect(),
        None => Vec::new(),
    };

    let mut missing_value_columns = Vec::new();
    let mut value_issues = Vec::new();
    for column in VALUE_COLUMNS {
        let Some(idx) = table.column_index(column) else {
            missing_value_columns.push(column.to_string());
            continue;
        };
        for (i, row) in table.rows.iter().enumerate() {
            if let Some(problem) = check_value(&row[idx]) {
                value_issues.push(ValueIssue {
                    line: i + 2,
                    column: column.to_string(),
                    value: row[idx].clone(),
                    problem,
                });
            }
        }
    }

    Ok(ValidationReport {
        path: path.to_path_buf(),
        total_rows: table.len(),
        first_timestamp,
        last_timestamp,
        invalid_timestamps,
        duplicates,
        interval,
        missing_slot_count,
        missing_slots,
        off_grid_lines,
        missing_value_columns,
        value_issues,
    })
}

/// Most common gap between sorted distinct timestamps, ties going to the
/// shorter gap
///
/// Gaps under `MIN_INTERVAL_SECS` are ignored so a stray row cannot shrink the
/// grid; one hour when no gap qualifies.
fn infer_interval(distinct: &[DateTime<FixedOffset>]) -> Duration {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for pair in distinct.windows(2) {
        let seconds = (pair[1] - pair[0]).num_seconds();
        if seconds >= MIN_INTERVAL_SECS {
            *counts.entry(seconds).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(seconds, count)| (count, Reverse(seconds)))
        .map(|(seconds, _)| Duration::seconds(seconds))
        .unwrap_or_else(|| Duration::hours(1))
}

fn on_grid(first: DateTime<FixedOffset>, ts: DateTime<FixedOffset>, interval: Duration) -> bool {
    let step = interval.num_seconds();
    step <= 0 || (ts - first).num_seconds() % step == 0
}

/// Grid slots between the first and last timestamp that hold no row
fn find_gaps(
    distinct: &[DateTime<FixedOffset>],
    interval: Duration,
) -> (usize, Vec<DateTime<FixedOffset>>) {
    let (Some(&first), Some(&last)) = (distinct.first(), distinct.last()) else {
        return (0, Vec::new());
    };
    let present: BTreeSet<DateTime<FixedOffset>> = distinct.iter().copied().collect();

    let mut count = 0;
    let mut listed = Vec::new();
    let mut slot = first;
    while slot <= last {
        if !present.contains(&slot) {
            count += 1;
            if listed.len() < MAX_LISTED_GAPS {
                listed.push(slot);
            }
        }
        slot += interval;
    }
    (count, listed)
}

fn check_value(cell: &str) -> Option<ValueProblem> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Some(ValueProblem::Empty);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_nan() => Some(ValueProblem::NonNumeric),
        Ok(v) if v < 0.0 => Some(ValueProblem::Negative),
        Ok(_) => None,
        Err(_) => Some(ValueProblem::NonNumeric),
    }
}

fn format_interval(interval: Duration) -> String {
    let minutes = interval.num_minutes();
    if minutes > 0 && interval.num_seconds() % 60 == 0 {
        if minutes % 60 == 0 {
            format!("{} h", minutes / 60)
        } else {
            format!("{minutes} min")
        }
    } else {
        format!("{} s", interval.num_seconds())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Validation Report: {}", self.path.display())?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Total Rows:         {}", self.total_rows)?;
        match (&self.first_timestamp, &self.last_timestamp) {
            (Some(first), Some(last)) => writeln!(
                f,
                "Date Range:         {} to {}",
                format_timestamp(first),
                format_timestamp(last)
            )?,
            _ => writeln!(f, "Date Range:         (no valid timestamps)")?,
        }
        writeln!(f, "Interval:           {}", format_interval(self.interval))?;
        writeln!(f, "{}", "-".repeat(60))?;

        writeln!(f, "Invalid Timestamps: {}", self.invalid_timestamps.len())?;
        for (line, value) in self.invalid_timestamps.iter().take(MAX_LISTED_ROWS) {
            writeln!(f, "  line {line}: '{value}'")?;
        }

        writeln!(
            f,
            "Duplicate Times:    {} ({} extra rows)",
            self.duplicates.len(),
            self.duplicate_rows()
        )?;
        for dup in self.duplicates.iter().take(MAX_LISTED_ROWS) {
            let lines: Vec<String> = dup.lines.iter().map(|l| l.to_string()).collect();
            writeln!(
                f,
                "  {} x{} (lines {})",
                format_timestamp(&dup.timestamp),
                dup.count,
                lines.join(", ")
            )?;
        }

        writeln!(f, "Missing Slots:      {}", self.missing_slot_count)?;
        for slot in &self.missing_slots {
            writeln!(f, "  {}", format_timestamp(slot))?;
        }
        if self.missing_slot_count > self.missing_slots.len() {
            writeln!(
                f,
                "  ... and {} more",
                self.missing_slot_count - self.missing_slots.len()
            )?;
        }

        writeln!(f, "Off-grid Times:     {}", self.off_grid_lines.len())?;
        for line in self.off_grid_lines.iter().take(MAX_LISTED_ROWS) {
            writeln!(f, "  line {line}")?;
        }

        for column in &self.missing_value_columns {
            writeln!(f, "Missing Column:     {column}")?;
        }
        writeln!(f, "Value Issues:       {}", self.value_issues.len())?;
        for issue in self.value_issues.iter().take(MAX_LISTED_ROWS) {
            writeln!(
                f,
                "  line {} {}: {} '{}'",
                issue.line, issue.column, issue.problem, issue.value
            )?;
        }

        writeln!(f, "{}", "=".repeat(60))?;
        if self.issues_found() {
            write!(f, "Issues found")
        } else {
            write!(f, "No issues found")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str, &str)]) -> Table {
        let mut t = Table::new(vec![
            "date_time".to_string(),
            "load".to_string(),
            "forecasted_load".to_string(),
        ]);
        t.rows = rows
            .iter()
            .map(|(ts, load, fc)| vec![ts.to_string(), load.to_string(), fc.to_string()])
            .collect();
        t
    }

    #[test]
    fn test_clean_quarter_hour_table() {
        let t = table(&[
            ("2024-01-01 00:00:00+06:00", "800", "790"),
            ("2024-01-01 00:15:00+06:00", "810", "800"),
            ("2024-01-01 00:30:00+06:00", "805", "801"),
        ]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();

        assert_eq!(report.interval, Duration::minutes(15));
        assert!(!report.issues_found());
        assert!(report.to_string().ends_with("No issues found"));
    }

    #[test]
    fn test_duplicates_and_gaps() {
        let t = table(&[
            ("2024-01-01 00:00:00+06:00", "1", "1"),
            ("2024-01-01 01:00:00+06:00", "1", "1"),
            ("2024-01-01 01:00:00+06:00", "1", "1"),
            ("2024-01-01 04:00:00+06:00", "1", "1"),
        ]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();

        assert_eq!(report.interval, Duration::hours(1));
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].count, 2);
        assert_eq!(report.duplicates[0].lines, vec![3, 4]);
        assert_eq!(report.duplicate_rows(), 1);
        assert_eq!(report.missing_slot_count, 2);
        assert_eq!(
            format_timestamp(&report.missing_slots[0]),
            "2024-01-01 02:00:00+06:00"
        );
    }

    #[test]
    fn test_off_grid_and_bad_values() {
        let t = table(&[
            ("2024-01-01 00:00:00+06:00", "", "1"),
            ("2024-01-01 01:00:00+06:00", "n/a", "-4"),
            ("2024-01-01 01:30:00+06:00", "1", "1"),
            ("2024-01-01 02:00:00+06:00", "1", "1"),
            ("2024-01-01 03:00:00+06:00", "1", "1"),
            ("2024-01-01 04:00:00+06:00", "1", "1"),
            ("not a time", "1", "1"),
        ]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();

        assert_eq!(report.interval, Duration::hours(1));
        assert_eq!(report.missing_slot_count, 0);
        assert_eq!(report.off_grid_lines, vec![4]);
        assert_eq!(report.invalid_timestamps, vec![(8, "not a time".to_string())]);

        let problems: Vec<(usize, ValueProblem)> =
            report.value_issues.iter().map(|i| (i.line, i.problem)).collect();
        assert_eq!(
            problems,
            vec![
                (2, ValueProblem::Empty),
                (3, ValueProblem::NonNumeric),
                (3, ValueProblem::Negative)
            ]
        );
    }

    fn series(start: &str, step: Duration, count: usize) -> Table {
        let start = parse_timestamp(start).unwrap();
        let mut t = Table::new(vec![
            "date_time".to_string(),
            "load".to_string(),
            "forecasted_load".to_string(),
        ]);
        for i in 0..count {
            let ts = start + step * i as i32;
            t.rows
                .push(vec![format_timestamp(&ts), "1".to_string(), "1".to_string()]);
        }
        t
    }

    #[test]
    fn test_stray_row_keeps_hourly_grid() {
        let mut t = series("2024-01-01 00:00:00+06:00", Duration::hours(1), 48);
        t.rows.push(vec![
            "2024-01-01 05:30:00+06:00".to_string(),
            "1".to_string(),
            "1".to_string(),
        ]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();

        assert_eq!(report.interval, Duration::hours(1));
        assert_eq!(report.missing_slot_count, 0);
        assert_eq!(report.off_grid_lines, vec![50]);
    }

    #[test]
    fn test_sub_minute_stray_ignored_for_interval() {
        let mut t = series("2024-01-01 00:00:00+06:00", Duration::days(1), 365);
        t.rows.push(vec![
            "2024-01-01 00:00:01+06:00".to_string(),
            "1".to_string(),
            "1".to_string(),
        ]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();

        assert_eq!(report.interval, Duration::days(1));
        assert_eq!(report.missing_slot_count, 0);
        assert_eq!(report.off_grid_lines, vec![367]);
    }

    #[test]
    fn test_single_row_defaults_to_hourly() {
        let t = table(&[("2024-01-01 00:00:00+06:00", "1", "1")]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();
        assert_eq!(report.interval, Duration::hours(1));
        assert_eq!(report.missing_slot_count, 0);
    }

    #[test]
    fn test_gap_listing_is_capped() {
        let t = table(&[
            ("2024-01-01 00:00:00+06:00", "1", "1"),
            ("2024-01-01 00:15:00+06:00", "1", "1"),
            ("2024-01-03 00:00:00+06:00", "1", "1"),
        ]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();
        assert_eq!(report.missing_slot_count, 2 * 96 - 2);
        assert_eq!(report.missing_slots.len(), MAX_LISTED_GAPS);
        assert!(report.to_string().contains("... and 140 more"));
    }

    #[test]
    fn test_missing_value_column_reported() {
        let mut t = Table::new(vec!["date_time".to_string(), "load".to_string()]);
        t.rows.push(vec!["2024-01-01 00:00:00+06:00".to_string(), "1".to_string()]);
        let report = check_table(&t, Path::new("m.csv")).unwrap();
        assert_eq!(report.missing_value_columns, vec!["forecasted_load".to_string()]);
        assert!(report.issues_found());
    }

    #[test]
    fn test_requires_date_time() {
        let t = Table::new(vec!["time".to_string()]);
        assert!(check_table(&t, Path::new("m.csv")).is_err());
    }
}
