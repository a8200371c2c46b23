//! Output formatters for fetched device-sessions.
//!
//! - JSON for automation and scripting, written to stdout
//! - CSV for spreadsheets and `set-sessions`, written to a timestamped file
//!
//! # Example
//!
//! ```no_run
//! use session_wrench::output::json::JsonOutput;
//! use session_wrench::session::SessionRecord;
//!
//! let sessions: Vec<SessionRecord> = Vec::new();
//! let output = JsonOutput::new(&sessions);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod csv;
pub mod json;

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::ValueEnum;
use thiserror::Error;

use crate::session::SessionRecord;

// Re-export main types
pub use self::csv::{CsvOutput, CsvOutputError};
pub use self::json::{JsonOutput, JsonOutputError};

/// Output format for fetched sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON on standard output
    Json,
    /// CSV file in the output directory
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Errors writing an export.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Json(#[from] JsonOutputError),

    #[error(transparent)]
    Csv(#[from] CsvOutputError),

    /// The export file could not be created.
    #[error("cannot create {path}: {source}")]
    Create {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Exports taken in the same minute get `-2`, `-3`, ... up to this suffix.
const MAX_EXPORTS_PER_NAME: u32 = 1000;

/// Write `sessions` in `format`.
///
/// JSON goes to `stdout`. CSV goes to a new timestamped file in `out_dir`,
/// whose path is returned. An existing export is never overwritten.
pub fn write_sessions<W: Write>(
    sessions: &[SessionRecord],
    format: OutputFormat,
    out_dir: &Path,
    stdout: &mut W,
) -> Result<Option<PathBuf>, OutputError> {
    match format {
        OutputFormat::Json => {
            JsonOutput::new(sessions).write_to(stdout, true)?;
            Ok(None)
        }
        OutputFormat::Csv => {
            let (path, file) = create_export(out_dir, &self::csv::file_name(&Local::now()))?;
            CsvOutput::new(sessions).write_to(BufWriter::new(file))?;
            log::info!("{} session(s) written to {}", sessions.len(), path.display());
            Ok(Some(path))
        }
    }
}

/// Create `name` in `out_dir`, or the first free `-N` variant of it.
fn create_export(out_dir: &Path, name: &str) -> Result<(PathBuf, File), OutputError> {
    let stem = name.strip_suffix(".csv").unwrap_or(name);
    let mut path = out_dir.join(name);
    for n in 2..=MAX_EXPORTS_PER_NAME + 1 {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                path = out_dir.join(format!("{stem}-{n}.csv"));
            }
            Err(source) => return Err(OutputError::Create { path, source }),
        }
    }
    Err(OutputError::Create {
        path,
        source: io::Error::new(io::ErrorKind::AlreadyExists, "too many exports with this name"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_goes_to_writer() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        let path = write_sessions(&[], OutputFormat::Json, dir.path(), &mut out).unwrap();
        assert!(path.is_none());
        assert_eq!(String::from_utf8(out).unwrap().trim(), "[]");
    }

    #[test]
    fn test_csv_goes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        let path = write_sessions(&[], OutputFormat::Csv, dir.path(), &mut out)
            .unwrap()
            .unwrap();
        assert!(out.is_empty());
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sessions_") && name.ends_with(".csv"));
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("MACVersion,"));
    }

    #[test]
    fn test_same_minute_export_keeps_earlier_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sessions_1405-01032024.csv"), "first").unwrap();

        let (path, mut file) = create_export(dir.path(), "sessions_1405-01032024.csv").unwrap();
        file.write_all(b"second").unwrap();
        assert_eq!(path, dir.path().join("sessions_1405-01032024-2.csv"));

        let (path, _) = create_export(dir.path(), "sessions_1405-01032024.csv").unwrap();
        assert_eq!(path, dir.path().join("sessions_1405-01032024-3.csv"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("sessions_1405-01032024.csv")).unwrap(),
            "first"
        );
    }

    #[test]
    fn test_repeated_csv_exports_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        let first = write_sessions(&[], OutputFormat::Csv, dir.path(), &mut out).unwrap().unwrap();
        let second = write_sessions(&[], OutputFormat::Csv, dir.path(), &mut out).unwrap().unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }
}
