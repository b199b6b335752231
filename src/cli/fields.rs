//! fields command: list the fields of a template body

use super::util::{has_flag, load_config, positional, read_file};
use docfield::*;

pub fn cmd_fields(args: &[String]) -> Result<()> {
    let body_path = positional(args, &["--config", "-c"])
        .ok_or(Error::from("Usage: docfield fields <body.xml> [--config <file>] [--json]"))?;

    let config = load_config(args)?;
    let doc = Document::parse(&read_file(body_path)?)?;
    let records = Engine::new(&config).locate(&doc);
    let summary = summarize(&records);

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.is_empty() {
        println!("No fields found");
        return Ok(());
    }

    let width = summary.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for entry in &summary {
        println!(
            "{:<width$}  {:<11}  {}",
            entry.name,
            entry.kind.to_string(),
            entry.count,
            width = width
        );
    }
    println!();
    println!(
        "{} distinct field(s), {} occurrence(s)",
        summary.len(),
        records.len()
    );
    Ok(())
}
