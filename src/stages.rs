// File-to-file transformation steps chained by the pipeline driver
//
// Each stage reads its inputs from disk, writes exactly one output file
// atomically, and reports what it did in a `StageStats`.

pub mod excel_merge;
pub mod finalize;
pub mod holiday_enrich;
pub mod weather_merge;

use std::path::PathBuf;

use crate::importers::HolidayImportError;
use crate::table::TableError;

pub use excel_merge::{find_excel_files, merge_excel_files, ExcelMergeOptions, ExcelMergeStats};
pub use finalize::{finalize_output, outputs_identical, FinalizeStats};
pub use holiday_enrich::{enrich_with_holidays, EnrichStats};
pub use weather_merge::{merge_weather, WeatherMergeStats, OUTPUT_COLUMNS};

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("File not found: {0}")]
    MissingFile(PathBuf),

    #[error("No Excel files found in {0}")]
    NoWorkbooks(PathBuf),

    #[error("No data extracted from Excel files in {0}")]
    NoData(PathBuf),

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Invalid timestamp in {path} at row {row}: '{value}'")]
    InvalidTimestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("Holiday list error: {0}")]
    Holiday(#[from] HolidayImportError),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Uniform summary of a completed stage, recorded in the pipeline state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageStats {
    pub rows: Option<usize>,
    pub summary: String,
}
