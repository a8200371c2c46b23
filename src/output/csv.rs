//! CSV output for fetched device-sessions.
//!
//! One row per session with the columns of
//! [`SESSION_COLUMNS`](crate::import::columns::SESSION_COLUMNS), so an export
//! can be fed back to `set-sessions` unchanged.

use std::io;

use chrono::{DateTime, TimeZone};
use thiserror::Error;

use crate::import::columns;
use crate::session::SessionRecord;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// File name for an export taken at `now`, e.g. `sessions_1405-01032024.csv`.
#[must_use]
pub fn file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("sessions_{}.csv", now.format("%H%M-%d%m%Y"))
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    sessions: &'a [SessionRecord],
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(sessions: &'a [SessionRecord]) -> Self {
        Self { sessions }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(columns::header())?;
        for session in self.sessions {
            csv_writer.write_record(columns::row(session))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
