//! Conversions from calamine cells to the values the pipeline works with
//!
//! Spreadsheet exports are inconsistent about cell types: the same column can
//! hold real Excel dates, serial numbers without a date style, or text.

use calamine::Data;
use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::timestamp::{excel_serial_to_datetime, localize, parse_date, parse_timestamp};

/// Read a timestamp cell; `Ok(None)` for an empty cell, `Err` for anything unreadable
pub fn cell_to_timestamp(cell: Option<&Data>) -> Result<Option<DateTime<FixedOffset>>, String> {
    match cell {
        Some(Data::DateTime(excel_date)) => excel_date
            .as_datetime()
            .map(|dt| Some(localize(dt)))
            .ok_or_else(|| format!("Unrepresentable Excel date: {excel_date:?}")),
        Some(Data::DateTimeIso(s)) | Some(Data::String(s)) => {
            if s.trim().is_empty() {
                return Ok(None);
            }
            parse_timestamp(s).map(Some).map_err(|e| e.to_string())
        }
        Some(Data::Float(f)) => excel_serial_to_datetime(*f)
            .map(|dt| Some(localize(dt)))
            .ok_or_else(|| format!("Invalid Excel serial date: {f}")),
        Some(Data::Int(i)) => excel_serial_to_datetime(*i as f64)
            .map(|dt| Some(localize(dt)))
            .ok_or_else(|| format!("Invalid Excel serial date: {i}")),
        Some(Data::Empty) | None => Ok(None),
        Some(other) => Err(format!("Expected date/time, got: {other:?}")),
    }
}

/// Read a calendar date cell; `Ok(None)` for an empty cell
pub fn cell_to_date(cell: Option<&Data>) -> Result<Option<NaiveDate>, String> {
    match cell {
        Some(Data::DateTime(excel_date)) => excel_date
            .as_datetime()
            .map(|dt| Some(dt.date()))
            .ok_or_else(|| format!("Unrepresentable Excel date: {excel_date:?}")),
        Some(Data::DateTimeIso(s)) | Some(Data::String(s)) => {
            if s.trim().is_empty() {
                return Ok(None);
            }
            parse_date(s).map(Some).map_err(|e| e.to_string())
        }
        Some(Data::Float(f)) => excel_serial_to_datetime(*f)
            .map(|dt| Some(dt.date()))
            .ok_or_else(|| format!("Invalid Excel serial date: {f}")),
        Some(Data::Int(i)) => excel_serial_to_datetime(*i as f64)
            .map(|dt| Some(dt.date()))
            .ok_or_else(|| format!("Invalid Excel serial date: {i}")),
        Some(Data::Empty) | None => Ok(None),
        Some(other) => Err(format!("Expected date, got: {other:?}")),
    }
}

/// Numeric cell value, coercing anything non-numeric to `None`
pub fn cell_to_f64(cell: Option<&Data>) -> Option<f64> {
    match cell {
        Some(Data::Float(f)) if f.is_finite() => Some(*f),
        Some(Data::Int(i)) => Some(*i as f64),
        Some(Data::String(s)) => {
            let cleaned = s.trim().replace(',', "");
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Integer cell value; floats are truncated toward zero
pub fn cell_to_i64(cell: Option<&Data>) -> Result<Option<i64>, String> {
    match cell {
        Some(Data::Int(i)) => Ok(Some(*i)),
        Some(Data::Float(f)) if f.is_finite() => Ok(Some(f.trunc() as i64)),
        Some(Data::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(|f| Some(f.trunc() as i64))
                .map_err(|_| format!("Cannot parse integer value: {s}"))
        }
        Some(Data::Empty) | None => Ok(None),
        Some(other) => Err(format!("Expected integer, got: {other:?}")),
    }
}
