use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::{StageError, StageStats};
use crate::importers::{LoadRecord, LoadWorkbook};
use crate::table::Table;
use crate::timestamp::{format_timestamp, is_on_the_hour};

/// Header of the master table produced by this stage
pub const MASTER_COLUMNS: [&str; 3] = ["date_time", "load", "forecasted_load"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelMergeOptions {
    /// Keep only readings that fall exactly on the hour
    pub hourly_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcelMergeStats {
    pub files_found: usize,
    pub files_read: usize,
    pub files_failed: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub rows_filtered: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

impl From<ExcelMergeStats> for StageStats {
    fn from(stats: ExcelMergeStats) -> Self {
        StageStats {
            rows: Some(stats.rows_written),
            summary: format!(
                "{} of {} workbooks read, {} malformed rows skipped",
                stats.files_read, stats.files_found, stats.rows_skipped
            ),
        }
    }
}

/// List the load workbooks under `dir`, recursively, in a stable order
///
/// Previous consolidated exports (`*all_data*`) and Excel lock files (`~$*`)
/// are not load data and are left out.
pub fn find_excel_files(dir: &Path) -> Result<Vec<PathBuf>, StageError> {
    if !dir.is_dir() {
        return Err(StageError::MissingDirectory(dir.to_path_buf()));
    }

    let pattern = format!(
        "{}/**/*.xlsx",
        glob::Pattern::escape(&dir.to_string_lossy())
    );

    let mut files: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Cannot read {}: {}", e.path().display(), e);
                None
            }
        })
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            !name.contains("all_data") && !name.starts_with("~$")
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Merge every load workbook under `excel_dir` into one CSV at `output`
///
/// All rows are kept as read (no de-duplication) and ordered by timestamp; a
/// workbook that cannot be read is skipped with a warning.
#[instrument(skip_all, fields(excel_dir = %excel_dir.display(), output = %output.display()))]
pub fn merge_excel_files(
    excel_dir: &Path,
    output: &Path,
    options: ExcelMergeOptions,
) -> Result<ExcelMergeStats, StageError> {
    let start_time = Instant::now();
    let files = find_excel_files(excel_dir)?;
    if files.is_empty() {
        return Err(StageError::NoWorkbooks(excel_dir.to_path_buf()));
    }

    info!("Found {} Excel files to process", files.len());
    let mut stats = ExcelMergeStats {
        files_found: files.len(),
        ..Default::default()
    };

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map(|style| style.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut records: Vec<LoadRecord> = Vec::new();
    for file in &files {
        pb.set_message(
            file.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );

        match LoadWorkbook::new(file).read_records() {
            Ok(sheet) => {
                stats.files_read += 1;
                stats.rows_skipped += sheet.skipped_rows;
                records.extend(sheet.records);
            }
            Err(e) => {
                warn!("Error processing {}: {}", file.display(), e);
                stats.files_failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if options.hourly_only {
        let before = records.len();
        records.retain(|r| is_on_the_hour(&r.date_time));
        stats.rows_filtered = before - records.len();
        info!("Dropped {} sub-hourly rows", stats.rows_filtered);
    }

    if records.is_empty() {
        return Err(StageError::NoData(excel_dir.to_path_buf()));
    }

    // Stable sort: rows sharing a timestamp keep file order
    records.sort_by_key(|r| r.date_time);

    let table = records_to_table(&records);
    info!("Saving {} rows to {}", table.len(), output.display());
    table.write_csv(output)?;

    stats.rows_written = table.len();
    stats.first_timestamp = table.rows.first().map(|r| r[0].clone());
    stats.last_timestamp = table.rows.last().map(|r| r[0].clone());

    info!(
        rows = stats.rows_written,
        skipped = stats.rows_skipped,
        failed_files = stats.files_failed,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Created {}",
        output.display()
    );
    if let (Some(first), Some(last)) = (&stats.first_timestamp, &stats.last_timestamp) {
        info!("Date range: {} to {}", first, last);
    }

    Ok(stats)
}

fn records_to_table(records: &[LoadRecord]) -> Table {
    let mut table = Table::new(MASTER_COLUMNS.iter().map(|c| c.to_string()).collect());
    table.rows = records
        .iter()
        .map(|r| {
            vec![
                format_timestamp(&r.date_time),
                format_number(r.load),
                format_number(r.forecasted_load),
            ]
        })
        .collect();
    table
}

fn format_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
