//! Config and schema CLI commands

use super::util::load_config;
use docfield::*;

/// Print the effective configuration as YAML
pub fn cmd_config(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    print!("{}", serde_norway::to_string(&config)?);
    Ok(())
}

pub fn cmd_schema(args: &[String]) -> Result<()> {
    let schema_name = args.first().map(|s| s.as_str()).unwrap_or("list");

    match schema_name {
        "list" => {
            println!("Available schemas: config, mapping, report, mapping-report, fields");
            Ok(())
        }
        "config" => print_schema::<EngineConfig>(),
        "mapping" => print_schema::<TemplateMapping>(),
        "report" => print_schema::<RunReport>(),
        "mapping-report" => print_schema::<MappingReport>(),
        "fields" => print_schema::<Vec<FieldSummary>>(),
        _ => Err(format!("Unknown schema: {}", schema_name).into()),
    }
}

fn print_schema<T: schemars::JsonSchema>() -> Result<()> {
    let schema = schemars::schema_for!(T);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
