//! Reader for the delimited sample rows written by `xctrace_to_csv`.
//!
//! Each line holds one sample:
//!
//! ```text
//! timestamp;weight;0xAddress;symbol;library;pmc-events
//! ```
//!
//! Trailing fields may be omitted. Empty `symbol` and `library` fields mean
//! the sample had no resolved top frame, and `pmc-events` is a
//! space-separated list of counter values.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use xctrace_csv_parse::SampleFile;
//!
//! let file = File::open("time-profile.csv").unwrap();
//! let samples = SampleFile::parse(file).unwrap();
//!
//! println!("Samples: {}", samples.len());
//! println!("Total weight: {}", samples.total_weight());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;

/// Field separator.
pub const DELIMITER: char = ';';

/// Number of fields in a row.
pub const FIELD_COUNT: usize = 6;

/// Errors that can occur while reading sample rows.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: expected at most {max} fields, found {found}", max = FIELD_COUNT)]
    TooManyFields { line: usize, found: usize },

    #[error("line {line}: invalid {field} '{value}'")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: invalid address '{value}'")]
    InvalidAddress { line: usize, value: String },
}

/// Result type for row parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// One sample row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Sample timestamp in nanoseconds since the start of the recording.
    pub time: u64,
    pub weight: u64,
    /// Address of the top frame, 0 when the sample had no backtrace.
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pmc_events: Vec<u64>,
}

impl SampleRecord {
    /// Parse a single row. `line` is 1-based and only used for errors.
    pub fn parse_line(text: &str, line: usize) -> Result<Self> {
        let parts: Vec<&str> = text.split(DELIMITER).collect();
        if parts.len() > FIELD_COUNT {
            return Err(ParseError::TooManyFields {
                line,
                found: parts.len(),
            });
        }
        let field = |idx: usize| parts.get(idx).copied().unwrap_or("");

        Ok(Self {
            time: parse_number(field(0), "time", line)?,
            weight: parse_number(field(1), "weight", line)?,
            address: parse_address(field(2), line)?,
            symbol: non_empty(field(3)),
            library: non_empty(field(4)),
            pmc_events: field(5)
                .split_whitespace()
                .map(|value| parse_number(value, "pmc event", line))
                .collect::<Result<_>>()?,
        })
    }
}

fn parse_number(value: &str, field: &'static str, line: usize) -> Result<u64> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        line,
        field,
        value: value.to_string(),
    })
}

fn parse_address(value: &str, line: usize) -> Result<u64> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        .ok_or_else(|| ParseError::InvalidAddress {
            line,
            value: value.to_string(),
        })
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// A parsed file of sample rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleFile {
    pub records: Vec<SampleRecord>,
}

impl SampleFile {
    /// Parse rows from any `Read`-able source.
    ///
    /// Reading stops at end of input or at the first blank line.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let buf_reader = BufReader::new(reader);
        let mut records = Vec::new();

        for (line_num, line_result) in buf_reader.lines().enumerate() {
            let line_num = line_num + 1; // 1-indexed for error messages
            let line = line_result?;

            if line.trim().is_empty() {
                break;
            }

            records.push(SampleRecord::parse_line(&line, line_num)?);
        }

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all sample weights.
    pub fn total_weight(&self) -> u64 {
        self.records.iter().map(|r| r.weight).sum()
    }

    /// Distinct top-frame symbols.
    pub fn symbols(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .filter_map(|r| r.symbol.as_deref())
            .collect()
    }

    /// Distinct top-frame libraries.
    pub fn libraries(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .filter_map(|r| r.library.as_deref())
            .collect()
    }
}
