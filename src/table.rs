// In-memory CSV tables exchanged between pipeline stages
//
// Every stage reads its input table fully, transforms it, and writes the
// result through `write_atomic` so a half-written file never appears under
// the final name.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{0} is empty (no header row)")]
    Empty(PathBuf),
}

/// Header row plus data rows, all as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column that must be present, with the file named in the error
    pub fn require_column(&self, name: &str, path: &Path) -> Result<usize, TableError> {
        self.column_index(name)
            .ok_or_else(|| TableError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    }

    /// Read a CSV file with a header row
    ///
    /// Short rows are padded with empty cells and long rows truncated so
    /// every row has exactly one cell per header.
    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|source| TableError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| TableError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(TableError::Empty(path.to_path_buf()));
        }

        let width = headers.len();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| TableError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        debug!("Read {} rows x {} columns from {}", rows.len(), width, path.display());
        Ok(Self { headers, rows })
    }

    /// Write the table as CSV, replacing `path` only once the write succeeded
    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        write_atomic(path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
            Ok(())
        })
    }
}

/// Write through a temp file in the destination directory, then rename it into place
///
/// The temp file is removed automatically if `write` fails.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), TableError>
where
    F: FnOnce(&mut File) -> Result<(), Box<dyn std::error::Error + Send + Sync>>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|source| io_error(&dir, source))?;

    write(temp.as_file_mut()).map_err(|e| {
        io_error(
            path,
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    })?;
    temp.as_file_mut()
        .flush()
        .map_err(|source| io_error(path, source))?;

    temp.persist(path)
        .map_err(|e| io_error(path, e.error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> TableError {
    TableError::Io {
        path: path.to_path_buf(),
        source,
    }
}
