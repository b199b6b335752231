//! Template engine
//!
//! Ties the pipeline together: locate the fields of a markup body, resolve
//! only the names actually located, rewrite the body and report what happened
//! to every field.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::format::ValueFormatter;
use crate::locate::{FieldKind, FieldRecord, Locator};
use crate::markup::Document;
use crate::mutate::{self, Action, Diagnostic};
use crate::resolve::{Resolver, TemplateMapping};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// What a run did to the template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    /// One entry per located field, in document order
    pub diagnostics: Vec<Diagnostic>,
    pub substituted: usize,
    pub removed: usize,
    /// Distinct names whose mapping entry failed to compile
    pub failed: Vec<String>,
}

impl RunReport {
    fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let substituted = diagnostics
            .iter()
            .filter(|d| d.action == Action::Substituted)
            .count();
        let removed = diagnostics.len() - substituted;

        let mut failed: Vec<String> = Vec::new();
        for d in &diagnostics {
            if d.error.is_some() && !failed.contains(&d.name) {
                failed.push(d.name.clone());
            }
        }

        Self {
            diagnostics,
            substituted,
            removed,
            failed,
        }
    }

    /// Number of fields processed
    pub fn total(&self) -> usize {
        self.diagnostics.len()
    }

    /// Diagnostics for one `(name, kind)` pair
    pub fn for_field<'a>(
        &'a self,
        name: &'a str,
        kind: FieldKind,
    ) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics
            .iter()
            .filter(move |d| d.name == name && d.kind == kind)
    }
}

/// Rewritten body plus report
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub body: String,
    pub report: RunReport,
}

/// Template engine, configured once and reusable across runs
#[derive(Debug, Clone)]
pub struct Engine {
    locator: Locator,
    formatter: ValueFormatter,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            locator: Locator::new(&config.locate),
            formatter: ValueFormatter::new(&config.format),
        }
    }

    pub fn formatter(&self) -> &ValueFormatter {
        &self.formatter
    }

    /// Locate fields without touching the document
    pub fn locate(&self, doc: &Document) -> Vec<FieldRecord> {
        self.locator.locate(doc)
    }

    /// Parse `body`, fill it and serialize the result
    pub fn run(&self, body: &str, mapping: &TemplateMapping, data: &Value) -> Result<RunOutput> {
        let mut doc = Document::parse(body)?;
        let report = self.apply(&mut doc, mapping, data)?;
        Ok(RunOutput {
            body: doc.to_xml()?,
            report,
        })
    }

    /// Fill an already parsed document in place.
    ///
    /// On error the document is unchanged.
    pub fn apply(
        &self,
        doc: &mut Document,
        mapping: &TemplateMapping,
        data: &Value,
    ) -> Result<RunReport> {
        let mut work = doc.clone();
        let split = mutate::isolate_markers(&mut work)?;
        if split > 0 {
            debug!(runs = split, "split runs holding several field markers");
        }

        let records = self.locator.locate(&work);
        let resolver = Resolver::new(mapping, &self.formatter);
        let resolutions = resolver.resolve(records.iter().map(|r| r.name.as_str()), data);

        let diagnostics = mutate::apply(&mut work, &records, &resolutions)?;
        *doc = work;
        let report = RunReport::from_diagnostics(diagnostics);

        info!(
            fields = report.total(),
            substituted = report.substituted,
            removed = report.removed,
            failed = report.failed.len(),
            "template filled"
        );
        Ok(report)
    }
}

/// Fill `body` with the default configuration
pub fn run(body: &str, mapping: &TemplateMapping, data: &Value) -> Result<RunOutput> {
    Engine::default().run(body, mapping, data)
}
