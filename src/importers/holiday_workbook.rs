use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::importers::cell::{cell_to_date, cell_to_i64};

/// Sheet holding the holiday calendar in `Holiday List.xlsx`
pub const HOLIDAY_SHEET: &str = "List of Holidays";

const DATE_COL: u32 = 0;
const TYPE_COL: u32 = 3;

#[derive(Error, Debug)]
pub enum HolidayImportError {
    #[error("Failed to open workbook: {0}")]
    WorkbookOpen(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Invalid data at row {row}, col {col}: {msg}")]
    InvalidData { row: u32, col: u32, msg: String },
}

/// A single entry of the holiday calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayRecord {
    pub date: NaiveDate,
    /// Holiday category code from column D (e.g. 1 = public, 2 = optional)
    pub holiday_type: i64,
}

/// Parser for the holiday calendar workbook
pub struct HolidayWorkbook {
    workbook_path: PathBuf,
    sheet_name: String,
}

impl HolidayWorkbook {
    pub fn new(workbook_path: impl Into<PathBuf>) -> Self {
        Self::with_sheet(workbook_path, HOLIDAY_SHEET)
    }

    pub fn with_sheet(workbook_path: impl Into<PathBuf>, sheet_name: impl Into<String>) -> Self {
        Self {
            workbook_path: workbook_path.into(),
            sheet_name: sheet_name.into(),
        }
    }

    /// Parse the holiday sheet
    ///
    /// # Expected Sheet Structure:
    /// ```text
    /// Row 1: Header
    /// Row 2+: Column A holiday date, column D holiday type (integer)
    /// ```
    /// Rows missing either value are dropped; a value that is present but
    /// unreadable fails the whole parse.
    pub fn parse_holidays(&self) -> Result<Vec<HolidayRecord>, HolidayImportError> {
        info!(
            "Parsing sheet '{}' of {}",
            self.sheet_name,
            self.workbook_path.display()
        );

        let mut workbook: Xlsx<BufReader<File>> = match open_workbook(&self.workbook_path) {
            Ok(wb) => wb,
            Err(e) => return Err(HolidayImportError::WorkbookOpen(e.to_string())),
        };

        let range = match workbook.worksheet_range(&self.sheet_name) {
            Ok(range) => range,
            Err(_) => return Err(HolidayImportError::SheetNotFound(self.sheet_name.clone())),
        };

        let holidays = parse_holiday_range(&range)?;
        info!("Found {} holidays in the holiday list", holidays.len());
        Ok(holidays)
    }

    /// Parse the sheet into a date -> holiday type lookup
    pub fn holiday_calendar(&self) -> Result<BTreeMap<NaiveDate, i64>, HolidayImportError> {
        Ok(build_calendar(self.parse_holidays()?))
    }
}

fn parse_holiday_range(range: &Range<Data>) -> Result<Vec<HolidayRecord>, HolidayImportError> {
    let (header_row, last_row) = match (range.start(), range.end()) {
        (Some((first, _)), Some((last, _))) => (first, last),
        _ => return Ok(Vec::new()),
    };

    let mut holidays = Vec::new();

    for row in (header_row + 1)..=last_row {
        let date = cell_to_date(range.get_value((row, DATE_COL))).map_err(|msg| {
            HolidayImportError::InvalidData {
                row: row + 1,
                col: DATE_COL + 1,
                msg,
            }
        })?;
        let holiday_type = cell_to_i64(range.get_value((row, TYPE_COL))).map_err(|msg| {
            HolidayImportError::InvalidData {
                row: row + 1,
                col: TYPE_COL + 1,
                msg,
            }
        })?;

        match (date, holiday_type) {
            (Some(date), Some(holiday_type)) => holidays.push(HolidayRecord { date, holiday_type }),
            _ => debug!("Row {} is incomplete, dropping", row + 1),
        }
    }

    Ok(holidays)
}

/// Later entries for the same date replace earlier ones
pub fn build_calendar(records: Vec<HolidayRecord>) -> BTreeMap<NaiveDate, i64> {
    let mut calendar = BTreeMap::new();
    for record in records {
        if let Some(previous) = calendar.insert(record.date, record.holiday_type) {
            debug!(
                "Holiday {} listed twice (type {} replaced by {})",
                record.date, previous, record.holiday_type
            );
        }
    }
    calendar
}
