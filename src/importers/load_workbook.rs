use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use chrono::{DateTime, FixedOffset};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::importers::cell::{cell_to_f64, cell_to_timestamp};

/// Columns A, B and D of a load export
const DATE_TIME_COL: u32 = 0;
const LOAD_COL: u32 = 1;
const FORECASTED_LOAD_COL: u32 = 3;

#[derive(Error, Debug)]
pub enum LoadWorkbookError {
    #[error("Failed to open workbook: {0}")]
    WorkbookOpen(String),

    #[error("Workbook has no worksheets")]
    NoWorksheet,

    #[error("Failed to read sheet {sheet}: {msg}")]
    SheetRead { sheet: String, msg: String },

    #[error("Sheet is empty")]
    EmptySheet,

    #[error("Expected at least 4 columns (A-D), found {0}")]
    SchemaMismatch(u32),
}

/// One load reading from a DPDC export row
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub date_time: DateTime<FixedOffset>,
    pub load: Option<f64>,
    pub forecasted_load: Option<f64>,
}

/// Records read from one workbook plus how many rows were rejected
#[derive(Debug, Clone, Default)]
pub struct LoadSheet {
    pub records: Vec<LoadRecord>,
    pub skipped_rows: usize,
}

/// Reader for a single DPDC load export
///
/// # Expected Sheet Structure:
/// ```text
/// Row 1: Header (Date Time | Load | ... | Forecasted Load)
/// Row 2+: Column A timestamp, column B load (MW), column D forecasted load (MW)
/// ```
/// Only the first worksheet is read.
pub struct LoadWorkbook {
    workbook_path: PathBuf,
}

impl LoadWorkbook {
    pub fn new(workbook_path: impl Into<PathBuf>) -> Self {
        Self {
            workbook_path: workbook_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.workbook_path
    }

    /// Read every data row of the first worksheet
    ///
    /// Rows whose timestamp is missing or unreadable are skipped and counted;
    /// non-numeric load values become `None`.
    pub fn read_records(&self) -> Result<LoadSheet, LoadWorkbookError> {
        // Synchronous, like every calamine read
        let mut workbook: Xlsx<BufReader<File>> = match open_workbook(&self.workbook_path) {
            Ok(wb) => wb,
            Err(e) => return Err(LoadWorkbookError::WorkbookOpen(e.to_string())),
        };

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(LoadWorkbookError::NoWorksheet)?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| LoadWorkbookError::SheetRead {
                sheet: sheet_name.clone(),
                msg: e.to_string(),
            })?;

        let sheet = self.parse_range(&range)?;
        debug!(
            "Read {} records ({} skipped) from {}",
            sheet.records.len(),
            sheet.skipped_rows,
            self.workbook_path.display()
        );
        Ok(sheet)
    }

    fn parse_range(&self, range: &Range<Data>) -> Result<LoadSheet, LoadWorkbookError> {
        let (header_row, _) = range.start().ok_or(LoadWorkbookError::EmptySheet)?;
        let (last_row, last_col) = range.end().ok_or(LoadWorkbookError::EmptySheet)?;

        if last_col < FORECASTED_LOAD_COL {
            return Err(LoadWorkbookError::SchemaMismatch(last_col + 1));
        }

        let mut sheet = LoadSheet::default();

        for row in (header_row + 1)..=last_row {
            let date_time = match cell_to_timestamp(range.get_value((row, DATE_TIME_COL))) {
                Ok(Some(ts)) => ts,
                Ok(None) => {
                    // Blank trailing rows are routine in these exports
                    if !self.row_is_blank(range, row) {
                        debug!("Row {} has no timestamp, skipping", row + 1);
                        sheet.skipped_rows += 1;
                    }
                    continue;
                }
                Err(msg) => {
                    warn!(
                        "Skipping malformed row {} in {}: {}",
                        row + 1,
                        self.workbook_path.display(),
                        msg
                    );
                    sheet.skipped_rows += 1;
                    continue;
                }
            };

            sheet.records.push(LoadRecord {
                date_time,
                load: cell_to_f64(range.get_value((row, LOAD_COL))),
                forecasted_load: cell_to_f64(range.get_value((row, FORECASTED_LOAD_COL))),
            });
        }

        Ok(sheet)
    }

    fn row_is_blank(&self, range: &Range<Data>, row: u32) -> bool {
        [DATE_TIME_COL, LOAD_COL, FORECASTED_LOAD_COL]
            .iter()
            .all(|col| matches!(range.get_value((row, *col)), None | Some(Data::Empty)))
    }
}
