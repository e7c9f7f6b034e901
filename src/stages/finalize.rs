use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use super::{StageError, StageStats};
use crate::config::FINAL_OUTPUT_FILE;
use crate::table::{write_atomic, TableError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeStats {
    pub destination: PathBuf,
    pub bytes: u64,
    /// Destination already held identical content and was left alone
    pub unchanged: bool,
}

impl From<FinalizeStats> for StageStats {
    fn from(stats: FinalizeStats) -> Self {
        StageStats {
            rows: None,
            summary: format!(
                "{} ({} bytes{})",
                stats.destination.display(),
                stats.bytes,
                if stats.unchanged { ", unchanged" } else { "" }
            ),
        }
    }
}

/// Publish `source` as `<output_dir>/master_data_with_forecasted.csv`
///
/// Creates `output_dir` if needed. Re-running with an unchanged source does
/// not touch the destination.
#[instrument(skip_all, fields(source = %source.display(), output_dir = %output_dir.display()))]
pub fn finalize_output(source: &Path, output_dir: &Path) -> Result<FinalizeStats, StageError> {
    if !source.is_file() {
        return Err(StageError::MissingFile(source.to_path_buf()));
    }

    if !output_dir.is_dir() {
        info!("Creating output directory: {}", output_dir.display());
        fs::create_dir_all(output_dir).map_err(|e| io_error(output_dir, e))?;
    }

    let destination = output_dir.join(FINAL_OUTPUT_FILE);
    let contents = fs::read(source).map_err(|e| io_error(source, e))?;
    let bytes = contents.len() as u64;

    if outputs_identical(source, &destination) {
        info!("{} is already up to date", destination.display());
        return Ok(FinalizeStats {
            destination,
            bytes,
            unchanged: true,
        });
    }

    info!("Copying to final location: {}", destination.display());
    write_atomic(&destination, |file| {
        file.write_all(&contents)?;
        Ok(())
    })?;

    info!("Created {} ({:.2} MB)", destination.display(), bytes as f64 / (1024.0 * 1024.0));
    Ok(FinalizeStats {
        destination,
        bytes,
        unchanged: false,
    })
}

/// True when both files exist and hold the same bytes
pub fn outputs_identical(a: &Path, b: &Path) -> bool {
    let (Ok(meta_a), Ok(meta_b)) = (fs::metadata(a), fs::metadata(b)) else {
        return false;
    };
    if meta_a.len() != meta_b.len() {
        return false;
    }
    match (fs::read(a), fs::read(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StageError {
    StageError::Table(TableError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_creates_directory_and_copies() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("merged_master_weather.csv");
        fs::write(&source, "date_time,load\n").unwrap();
        let output_dir = dir.path().join("static");

        let stats = finalize_output(&source, &output_dir).unwrap();
        assert!(!stats.unchanged);
        assert_eq!(stats.destination, output_dir.join(FINAL_OUTPUT_FILE));
        assert_eq!(fs::read_to_string(&stats.destination).unwrap(), "date_time,load\n");
    }

    #[test]
    fn test_finalize_twice_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("merged.csv");
        fs::write(&source, "a\n1\n").unwrap();

        finalize_output(&source, dir.path()).unwrap();
        let again = finalize_output(&source, dir.path()).unwrap();
        assert!(again.unchanged);
        assert_eq!(again.bytes, 4);
    }

    #[test]
    fn test_finalize_replaces_stale_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("merged.csv");
        fs::write(&source, "new\n").unwrap();
        fs::write(dir.path().join(FINAL_OUTPUT_FILE), "old\n").unwrap();

        let stats = finalize_output(&source, dir.path()).unwrap();
        assert!(!stats.unchanged);
        assert_eq!(fs::read_to_string(stats.destination).unwrap(), "new\n");
    }

    #[test]
    fn test_finalize_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = finalize_output(&dir.path().join("nope.csv"), dir.path()).unwrap_err();
        assert!(matches!(err, StageError::MissingFile(_)));
    }

    #[test]
    fn test_outputs_identical() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "x").unwrap();
        assert!(!outputs_identical(&a, &b));
        fs::write(&b, "x").unwrap();
        assert!(outputs_identical(&a, &b));
        fs::write(&b, "y").unwrap();
        assert!(!outputs_identical(&a, &b));
    }
}
