//! check command: validate a mapping

use super::util::{has_flag, load_config, parse_value_arg, positional, read_file, read_json};
use docfield::*;

const USAGE: &str =
    "Usage: docfield check <mapping.json> [--data <d.json>] [--template <body.xml>] [--json]";

pub fn cmd_check(args: &[String]) -> Result<()> {
    let mapping_path = positional(args, &["--data", "-d", "--template", "-t", "--config", "-c"])
        .ok_or(Error::from(USAGE))?;
    let mapping = TemplateMapping::from_json(&read_file(mapping_path)?)?;

    let data = match parse_value_arg(args, "--data", Some("-d")) {
        Some(path) => Some(read_json(path)?),
        None => None,
    };

    let fields = match parse_value_arg(args, "--template", Some("-t")) {
        Some(path) => {
            let config = load_config(args)?;
            let doc = Document::parse(&read_file(path)?)?;
            let records = Engine::new(&config).locate(&doc);
            Some(records.into_iter().map(|r| r.name).collect::<Vec<_>>())
        }
        None => None,
    };

    let report = check_mapping(
        &mapping,
        data.as_ref(),
        fields.as_ref().map(|names| names.iter().map(String::as_str)),
    );

    if has_flag(args, "--json") {
        let output = serde_json::json!({
            "valid": !report.has_errors(),
            "errors": report.error_count(),
            "warnings": report.warning_count(),
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if report.issues.is_empty() {
        println!("✓ Mapping is valid ({} entries)", report.entries_checked);
    } else {
        for issue in &report.issues {
            let prefix = match issue.severity {
                Severity::Error => "✗",
                Severity::Warning => "⚠",
                Severity::Info => "ℹ",
            };
            println!(
                "{} [{}] {}: {}",
                prefix,
                issue.code,
                issue.severity.to_string().to_uppercase(),
                issue.field
            );
            println!("  {}", issue.message);
        }
        println!();
        println!(
            "{} error(s), {} warning(s) in {} entries",
            report.error_count(),
            report.warning_count(),
            report.entries_checked
        );
    }

    if report.has_errors() {
        Err("Mapping check failed".into())
    } else {
        Ok(())
    }
}
