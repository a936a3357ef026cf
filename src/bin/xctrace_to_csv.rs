//! Convert an `xctrace export` XML document to delimited sample rows.
//!
//! Every `row` element of the export becomes one output line:
//! `time;weight;addr;sym;lib;events`.
//!
//! # Usage
//!
//! ```bash
//! xctrace_to_csv time-profile.xml time-profile.csv
//! ```

use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use xctrace_csv::xctrace::XctraceConverter;

#[derive(Parser, Debug)]
#[command(name = "xctrace_to_csv")]
#[command(about = "Convert an xctrace XML export to delimited sample rows")]
#[command(version)]
struct Args {
    /// Input XML file produced by `xctrace export`
    input: PathBuf,

    /// Output file, created or truncated
    output: PathBuf,
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Open input
    let input_file = File::open(&args.input).map_err(|e| {
        format!(
            "Failed to open input file '{}': {}",
            args.input.display(),
            e
        )
    })?;
    let reader = BufReader::new(input_file);

    // Create output, truncating anything left by an earlier run
    let output_file = File::create(&args.output).map_err(|e| {
        format!(
            "Failed to create output file '{}': {}",
            args.output.display(),
            e
        )
    })?;
    let mut writer = BufWriter::new(output_file);

    // Parse and resolve every row
    let mut converter = XctraceConverter::new();
    converter.parse(reader)?;

    converter.write_csv(&mut writer)?;
    writer.flush()?;

    eprintln!(
        "Converted '{}' -> '{}' ({} rows)",
        args.input.display(),
        args.output.display(),
        converter.samples().len()
    );

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
