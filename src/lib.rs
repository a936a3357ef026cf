//! Convert `xctrace` profile exports to delimited sample rows.
//!
//! Instruments' `xctrace export` writes profiling tables as XML in which
//! repeated values are shared through `id`/`ref` attributes. This crate
//! expands those references and flattens each sample into one line of
//! `time;weight;addr;sym;lib;events`, the format used by profiler test
//! fixtures.
//!
//! # Modules
//!
//! - [`resolve`] - Expand `id`/`ref` sharing into a resolved element tree
//! - [`xctrace`] - Extract sample fields and write delimited rows
//!
//! # Example
//!
//! ```no_run
//! use xctrace_csv::xctrace::XctraceConverter;
//! use std::fs::File;
//! use std::io::{BufReader, BufWriter};
//!
//! let input = BufReader::new(File::open("time-profile.xml").unwrap());
//! let output = BufWriter::new(File::create("time-profile.csv").unwrap());
//!
//! let mut converter = XctraceConverter::new();
//! converter.parse(input).unwrap();
//! converter.write_csv(output).unwrap();
//! ```

pub mod resolve;
pub mod xctrace;

// Re-export xctrace_csv_parse for convenience
pub use xctrace_csv_parse;
