// Integration tests for holiday enrichment with generated holiday workbooks

mod common;

use common::*;
use dpdc_load_pipeline::importers::{HolidayImportError, HolidayWorkbook};
use dpdc_load_pipeline::stages::{
    enrich_with_holidays, merge_excel_files, ExcelMergeOptions, StageError,
};
use dpdc_load_pipeline::table::Table;
use std::path::PathBuf;

fn two_day_master(dir: &std::path::Path) -> PathBuf {
    let excel_dir = dir.join("DPDC Load");
    write_day_workbook(&excel_dir.join("d1.xlsx"), day(2024, 2, 21), 800.0);
    write_day_workbook(&excel_dir.join("d2.xlsx"), day(2024, 2, 22), 820.0);
    let master = dir.join("master-data.csv");
    merge_excel_files(&excel_dir, &master, ExcelMergeOptions::default()).unwrap();
    master
}

#[test]
fn test_every_row_of_a_holiday_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let master = two_day_master(dir.path());
    let holidays = dir.path().join("Holiday List.xlsx");
    write_holiday_workbook(
        &holidays,
        &[
            (day(2024, 2, 21), 1, "Shaheed Day"),
            (day(2024, 3, 26), 1, "Independence Day"),
        ],
    );
    let output = dir.path().join("master-data-enriched.csv");

    let stats = enrich_with_holidays(&master, &holidays, &output).unwrap();
    assert_eq!(stats.holidays_listed, 2);
    assert_eq!(stats.rows, 192);
    assert_eq!(stats.holiday_rows, 96);

    let table = Table::read_csv(&output).unwrap();
    assert_eq!(
        table.headers,
        vec![
            "date_time",
            "load",
            "forecasted_load",
            "is_holiday",
            "holiday_type",
            "national_event_type"
        ]
    );
    for row in &table.rows {
        let on_holiday = row[0].starts_with("2024-02-21");
        assert_eq!(row[3], if on_holiday { "1" } else { "0" }, "row {row:?}");
        assert_eq!(row[4], if on_holiday { "1" } else { "0" });
        assert_eq!(row[5], "0");
    }
}

#[test]
fn test_holiday_type_code_is_carried() {
    let dir = tempfile::tempdir().unwrap();
    let master = two_day_master(dir.path());
    let holidays = dir.path().join("Holiday List.xlsx");
    write_holiday_workbook(&holidays, &[(day(2024, 2, 22), 2, "Optional holiday")]);
    let output = dir.path().join("enriched.csv");

    enrich_with_holidays(&master, &holidays, &output).unwrap();
    let table = Table::read_csv(&output).unwrap();
    assert_eq!(table.rows[0][4], "0");
    assert_eq!(table.rows[191][4], "2");
}

#[test]
fn test_calendar_reads_named_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let holidays = dir.path().join("Holiday List.xlsx");
    write_holiday_workbook(
        &holidays,
        &[
            (day(2024, 12, 16), 1, "Victory Day"),
            (day(2024, 12, 16), 3, "Victory Day (revised)"),
        ],
    );

    let calendar = HolidayWorkbook::new(&holidays).holiday_calendar().unwrap();
    assert_eq!(calendar.len(), 1);
    assert_eq!(calendar.get(&day(2024, 12, 16)), Some(&3));
}

#[test]
fn test_missing_sheet_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let master = two_day_master(dir.path());
    let holidays = dir.path().join("Holiday List.xlsx");
    write_holiday_workbook_on_sheet(&holidays, "Holidays 2024", &[(day(2024, 2, 21), 1, "x")]);
    let output = dir.path().join("enriched.csv");

    let err = enrich_with_holidays(&master, &holidays, &output).unwrap_err();
    match err {
        StageError::Holiday(HolidayImportError::SheetNotFound(sheet)) => {
            assert_eq!(sheet, "List of Holidays")
        }
        other => panic!("Expected SheetNotFound, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_missing_holiday_file() {
    let dir = tempfile::tempdir().unwrap();
    let master = two_day_master(dir.path());

    let err = enrich_with_holidays(
        &master,
        &dir.path().join("Holiday List.xlsx"),
        &dir.path().join("enriched.csv"),
    )
    .unwrap_err();
    assert!(matches!(err, StageError::MissingFile(_)));
}
