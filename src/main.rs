//! docfield CLI - Command-line interface
//!
//! Commands:
//!   fill    - Write data into a template body
//!   fields  - List the fields of a template body
//!   check   - Validate a mapping
//!   config  - Print the effective configuration
//!   schema  - Print JSON schemas

mod cli;

use cli::*;
use docfield::VERSION;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "DOCFIELD_LOG";

fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().collect();
    let verbose = take_flag(&mut args, "--verbose");
    init_logging(verbose);

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result = match args[1].as_str() {
        "fill" => cmd_fill(&args[2..]),
        "fields" => cmd_fields(&args[2..]),
        "check" => cmd_check(&args[2..]),
        "config" => cmd_config(&args[2..]),
        "schema" => cmd_schema(&args[2..]),
        "version" | "--version" | "-v" => {
            println!("docfield {}", VERSION);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            Err("Unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

/// Remove a global flag from the argument list
fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

/// Logs go to stderr so they never mix with a body written to stdout
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_usage() {
    println!(
        r#"
docfield - Field engine for word-processor templates

USAGE:
    docfield <COMMAND> [OPTIONS]

COMMANDS:
    fill <body.xml>                  Fill template fields from a data tree
        --mapping <m.json>            Field name -> expression table
        --data <d.json>               Data tree
        --derive                      Add derived values (totals, counts, timestamp) first
    fields <body.xml>                List fields found in a template
    check <mapping.json>             Validate a mapping
        --data <d.json>               Check paths against sample data
        --template <body.xml>         Cross-check against the template's fields
    config                           Print the effective configuration
    schema [name]                    Print JSON schema (config, mapping, report, mapping-report, fields)
    version                          Print version

OPTIONS:
    --output <file>                   Output file (default: stdout)
    --config <file>                   Configuration file (default: ./docfield.yaml if present)
    --json                            JSON output format (fill, fields, check)
    --verbose                         Debug logging (otherwise DOCFIELD_LOG, default: warn)

EXAMPLES:
    docfield fields objednavka.xml
    docfield fill objednavka.xml --mapping mapping.json --data order.json -o filled.xml
    docfield check mapping.json --data order.json --template objednavka.xml
    DOCFIELD_LOG=docfield=debug docfield fill ...
"#
    );
}
