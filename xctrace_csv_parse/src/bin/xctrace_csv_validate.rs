use std::env;
use std::fs::File;
use std::process::ExitCode;
use xctrace_csv_parse::SampleFile;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    let (path, json) = match args.as_slice() {
        [_, path] => (path, false),
        [_, path, flag] if flag == "--json" => (path, true),
        _ => {
            let program = args.first().map_or("xctrace_csv_validate", String::as_str);
            eprintln!("Usage: {} <file.csv> [--json]", program);
            return ExitCode::from(2);
        }
    };

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let samples = match SampleFile::parse(file) {
        Ok(samples) => samples,
        Err(e) => {
            eprintln!("Invalid sample file '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    if json {
        for record in &samples.records {
            match serde_json::to_string(record) {
                Ok(line) => println!("{}", line),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("Valid sample file: {}", path);
    println!("  Rows: {}", samples.len());
    println!("  Total weight: {}", samples.total_weight());
    println!("  Symbols: {}", samples.symbols().len());
    println!("  Libraries: {}", samples.libraries().len());
    ExitCode::SUCCESS
}
