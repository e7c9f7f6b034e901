// Fixture builders shared by the integration tests
//
// Workbooks are written as minimal OOXML packages with inline strings and
// unstyled numeric cells, which is enough for calamine to read them back.
#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

pub fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

pub fn number(n: f64) -> Cell {
    Cell::Number(n)
}

/// Excel serial number (days since 1899-12-30) of a local timestamp
pub fn excel_serial(dt: NaiveDateTime) -> f64 {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (dt - base).num_seconds() as f64 / 86_400.0
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_letter(col: usize) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_letter(c), r + 1);
            match cell {
                Cell::Text(s) => xml.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape(s)
                )),
                Cell::Number(n) => {
                    xml.push_str(&format!(r#"<c r="{reference}"><v>{n}</v></c>"#))
                }
                Cell::Empty => {}
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Write an .xlsx file with the given sheets, in order
pub fn write_xlsx(path: &Path, sheets: &[(&str, Vec<Vec<Cell>>)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );

    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(name)
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }
    content_types.push_str("</Types>");
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

    let mut parts: Vec<(String, String)> = vec![
        ("[Content_Types].xml".to_string(), content_types),
        ("_rels/.rels".to_string(), root_rels.to_string()),
        ("xl/workbook.xml".to_string(), workbook),
        ("xl/_rels/workbook.xml.rels".to_string(), rels),
    ];
    for (i, (_, rows)) in sheets.iter().enumerate() {
        parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet_xml(rows)));
    }

    for (name, body) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Load export with `count` readings every `step_minutes` from `start`
///
/// Load is `base + i`, forecast is `base + i - 5`; column C holds the unit.
pub fn write_load_workbook(
    path: &Path,
    start: NaiveDateTime,
    count: usize,
    step_minutes: i64,
    base: f64,
) {
    let mut rows = vec![vec![
        text("Date Time"),
        text("Load (MW)"),
        text("Unit"),
        text("Forecasted Load (MW)"),
    ]];
    for i in 0..count {
        let ts = start + Duration::minutes(step_minutes * i as i64);
        rows.push(vec![
            number(excel_serial(ts)),
            number(base + i as f64),
            text("MW"),
            number(base + i as f64 - 5.0),
        ]);
    }
    write_xlsx(path, &[("Sheet1", rows)]);
}

/// One day of quarter-hour readings (96 rows) starting at midnight
pub fn write_day_workbook(path: &Path, day: NaiveDate, base: f64) {
    write_load_workbook(path, day.and_hms_opt(0, 0, 0).unwrap(), 96, 15, base);
}

/// Holiday workbook with the calendar on the `List of Holidays` sheet
pub fn write_holiday_workbook(path: &Path, holidays: &[(NaiveDate, i64, &str)]) {
    write_holiday_workbook_on_sheet(path, "List of Holidays", holidays);
}

pub fn write_holiday_workbook_on_sheet(
    path: &Path,
    sheet: &str,
    holidays: &[(NaiveDate, i64, &str)],
) {
    let mut rows = vec![vec![text("Date"), text("Day"), text("Holiday"), text("Type")]];
    for (date, kind, name) in holidays {
        rows.push(vec![
            number(excel_serial(date.and_hms_opt(0, 0, 0).unwrap())),
            text(&date.format("%A").to_string()),
            text(name),
            number(*kind as f64),
        ]);
    }
    write_xlsx(path, &[("Cover", vec![vec![text("Holidays")]]), (sheet, rows)]);
}

/// Hourly weather CSV in the fetcher's layout covering `hours` hours from `start`
pub fn write_weather_csv(path: &Path, start: NaiveDateTime, hours: usize) {
    let mut csv = String::from("date_time,temp,dwpt,rhum,prcp,wdir,wspd,pres,coco\n");
    for i in 0..hours {
        let ts = start + Duration::hours(i as i64);
        csv.push_str(&format!(
            "{}+06:00,{},{},{},0,{},{},{},{}\n",
            ts.format("%Y-%m-%d %H:%M:%S"),
            15.0 + (i % 10) as f64,
            10.5,
            60 + (i % 30),
            300 + i % 60,
            3.6,
            1012.4,
            1 + i % 3
        ));
    }
    fs::write(path, csv).unwrap();
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
