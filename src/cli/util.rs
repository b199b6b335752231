//! CLI utility helpers

use docfield::{EngineConfig, Error, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Value following `flag` (or its short form), if present
pub fn parse_value_arg<'a>(args: &'a [String], flag: &str, short: Option<&str>) -> Option<&'a str> {
    for (i, arg) in args.iter().enumerate() {
        if arg == flag || Some(arg.as_str()) == short {
            if let Some(value) = args.get(i + 1) {
                return Some(value.as_str());
            }
        }
    }
    None
}

/// Parse --output argument to determine output file path
pub fn parse_output_arg(args: &[String]) -> Option<PathBuf> {
    parse_value_arg(args, "--output", Some("-o")).map(PathBuf::from)
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// First positional argument, skipping flags and their values
pub fn positional<'a>(args: &'a [String], flags_with_values: &[&str]) -> Option<&'a str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if flags_with_values.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if !arg.starts_with('-') {
            return Some(arg.as_str());
        }
    }
    None
}

pub fn read_file(path: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Other(format!("Cannot read {}: {}", path, e)))
}

pub fn read_json(path: &str) -> Result<Value> {
    let content = read_file(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Other(format!("Invalid JSON in {}: {}", path, e)))
}

/// `--config <file>`, else `docfield.yaml` in the working directory, else defaults
pub fn load_config(args: &[String]) -> Result<EngineConfig> {
    if let Some(path) = parse_value_arg(args, "--config", Some("-c")) {
        return EngineConfig::load(Path::new(path));
    }
    let cwd = std::env::current_dir().map_err(Error::Io)?;
    Ok(EngineConfig::load_from_dir(&cwd)?.unwrap_or_default())
}

/// Write content to file or stdout
pub fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content).map_err(Error::Io)?;
            eprintln!("Written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
