//! Mapping validation
//!
//! Checks a template mapping before it is used: entries that do not compile,
//! paths that find nothing in a sample data tree, template fields the mapping
//! forgets and entries the template never references.

use crate::expr::Expression;
use crate::resolve::TemplateMapping;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Severity level for mapping issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A problem found in a mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MappingIssue {
    pub severity: Severity,
    pub code: String,
    pub field: String,
    pub message: String,
}

impl MappingIssue {
    pub fn error(code: &str, field: &str, message: &str) -> Self {
        Self::new(Severity::Error, code, field, message)
    }

    pub fn warning(code: &str, field: &str, message: &str) -> Self {
        Self::new(Severity::Warning, code, field, message)
    }

    pub fn info(code: &str, field: &str, message: &str) -> Self {
        Self::new(Severity::Info, code, field, message)
    }

    fn new(severity: Severity, code: &str, field: &str, message: &str) -> Self {
        Self {
            severity,
            code: code.to_string(),
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result of [`check_mapping`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MappingReport {
    pub issues: Vec<MappingIssue>,
    /// Number of mapping entries examined
    pub entries_checked: usize,
}

impl MappingReport {
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.count(Severity::Warning) > 0
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Issues for one field, in report order
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a MappingIssue> + 'a {
        self.issues.iter().filter(move |i| i.field == field)
    }
}

/// Validate `mapping`, optionally against sample `data` and the field names
/// located in a template.
pub fn check_mapping<'f, I>(
    mapping: &TemplateMapping,
    data: Option<&Value>,
    fields: Option<I>,
) -> MappingReport
where
    I: IntoIterator<Item = &'f str>,
{
    let mut report = MappingReport {
        entries_checked: mapping.len(),
        ..MappingReport::default()
    };

    for (name, source) in mapping.iter() {
        if source.trim().is_empty() {
            report.issues.push(MappingIssue::warning(
                "W003",
                name,
                "Mapping entry is empty; the field will be removed",
            ));
            continue;
        }
        let expr = match Expression::compile(source) {
            Ok(expr) => expr,
            Err(e) => {
                report.issues.push(MappingIssue::error(
                    "E001",
                    name,
                    &format!("Expression '{}' does not compile: {}", source, e.detail()),
                ));
                continue;
            }
        };

        if let Some(data) = data {
            for path in expr.paths() {
                if path.lookup(data).is_none() {
                    report.issues.push(MappingIssue::warning(
                        "W001",
                        name,
                        &format!("Path '{}' has no value in the data", path.source()),
                    ));
                }
            }
        }
    }

    if let Some(fields) = fields {
        let located: BTreeSet<&str> = fields.into_iter().collect();

        for &field in &located {
            if !mapping.contains(field) {
                report.issues.push(MappingIssue::warning(
                    "W002",
                    field,
                    "Template field has no mapping entry and will be removed",
                ));
            }
        }

        for (name, _) in mapping.iter() {
            if !located.contains(name) {
                report.issues.push(MappingIssue::info(
                    "I001",
                    name,
                    "Mapping entry is not used by the template",
                ));
            }
        }
    }

    report
}
