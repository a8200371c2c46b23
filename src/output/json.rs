//! JSON output for fetched device-sessions.
//!
//! The document is an array with one object per session, using the record's
//! serde field names. Identifiers and keys are lowercase hex strings.

use std::io::Write;

use serde::Serialize;

use crate::session::SessionRecord;

/// JSON output formatter.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct JsonOutput<'a> {
    sessions: &'a [SessionRecord],
}

impl<'a> JsonOutput<'a> {
    /// Create a new JSON output over `sessions`.
    #[must_use]
    pub fn new(sessions: &'a [SessionRecord]) -> Self {
        Self { sessions }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer.
    ///
    /// # Arguments
    ///
    /// * `writer` - The writer to output to (e.g., stdout)
    /// * `pretty` - Whether to pretty-print the output
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::{DevAddr, Eui64};

    fn sample() -> Vec<SessionRecord> {
        vec![SessionRecord {
            mac_version: "1.0.3".into(),
            dev_eui: Eui64([0xaa, 0, 0, 0, 0, 0, 0, 1]),
            dev_addr: DevAddr([0x11, 0x22, 0x33, 0x44]),
            f_cnt_up: 42,
            ..Default::default()
        }]
    }

    #[test]
    fn test_json_output_empty() {
        let output = JsonOutput::new(&[]);
        assert_eq!(output.to_json().unwrap(), "[]");
    }

    #[test]
    fn test_json_fields() {
        let sessions = sample();
        let json = JsonOutput::new(&sessions).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["dev_eui"], "aa00000000000001");
        assert_eq!(value[0]["dev_addr"], "11223344");
        assert_eq!(value[0]["f_cnt_up"], 42);
    }

    #[test]
    fn test_json_parses_back() {
        let sessions = sample();
        let json = JsonOutput::new(&sessions).to_json_pretty().unwrap();
        let back: Vec<SessionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sessions);
    }

    #[test]
    fn test_write_to() {
        let sessions = sample();
        let mut buf = Vec::new();
        JsonOutput::new(&sessions).write_to(&mut buf, false).unwrap();
        assert!(buf.ends_with(b"\n"));
    }
}
