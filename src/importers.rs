// ! Spreadsheet readers for the load exports and the holiday calendar

pub mod cell;
pub mod holiday_workbook;
pub mod load_workbook;

// Re-export commonly used items
pub use holiday_workbook::{HolidayImportError, HolidayRecord, HolidayWorkbook, HOLIDAY_SHEET};
pub use load_workbook::{LoadRecord, LoadSheet, LoadWorkbook, LoadWorkbookError};
