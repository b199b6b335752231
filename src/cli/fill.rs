//! fill command: write data into a template body

use super::util::{
    has_flag, load_config, parse_output_arg, parse_value_arg, positional, read_file, read_json,
    write_output,
};
use docfield::*;

const USAGE: &str =
    "Usage: docfield fill <body.xml> --mapping <m.json> --data <d.json> [--output <file>] [--config <file>] [--derive] [--json]";

const VALUE_FLAGS: &[&str] = &[
    "--mapping",
    "-m",
    "--data",
    "-d",
    "--output",
    "-o",
    "--config",
    "-c",
];

pub fn cmd_fill(args: &[String]) -> Result<()> {
    let body_path = positional(args, VALUE_FLAGS).ok_or(Error::from(USAGE))?;
    let mapping_path = parse_value_arg(args, "--mapping", Some("-m")).ok_or(Error::from(USAGE))?;
    let data_path = parse_value_arg(args, "--data", Some("-d")).ok_or(Error::from(USAGE))?;
    let output = parse_output_arg(args);
    let json_output = has_flag(args, "--json");

    let config = load_config(args)?;
    let body = read_file(body_path)?;
    let mapping = TemplateMapping::from_json(&read_file(mapping_path)?)?;
    let mut data = read_json(data_path)?;

    if has_flag(args, "--derive") {
        enrich(&mut data, &config.derived, chrono::Local::now().naive_local())?;
    }

    let result = Engine::new(&config).run(&body, &mapping, &data)?;
    write_output(&output, &result.body)?;

    // with the body on stdout the report goes to stderr
    let report = if json_output {
        serde_json::to_string_pretty(&result.report)?
    } else {
        format_report(&result.report)
    };
    if output.is_some() {
        println!("{}", report);
    } else {
        eprintln!("{}", report);
    }
    Ok(())
}

fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    for d in &report.diagnostics {
        let mark = match d.action {
            Action::Substituted => "✓",
            Action::Removed => "✗",
        };
        out.push_str(&format!("{} {} [{}] {} ({})", mark, d.name, d.kind, d.action, d.status));
        if let Some(error) = &d.error {
            out.push_str(&format!(": {}", error));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{} field(s): {} substituted, {} removed",
        report.total(),
        report.substituted,
        report.removed
    ));
    if !report.failed.is_empty() {
        out.push_str(&format!("\nMapping errors: {}", report.failed.join(", ")));
    }
    out
}
