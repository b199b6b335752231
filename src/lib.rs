// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # docfield
//!
//! Field engine for word-processor templates.
//!
//! ## Core Concept
//!
//! A template body carries **fields**: `DOCVARIABLE` / `MERGEFIELD` marker
//! sequences (often split by the editor over many runs), named bookmarks,
//! tagged content controls and `{{name}}` tokens. A per-template **mapping**
//! says which data path fills which field. Given a JSON **data tree**,
//! docfield:
//!
//! - **Locates** every field construct, paragraph by paragraph
//! - **Resolves** each located name through its mapping expression
//! - **Formats** values (dates, money, flags) for the document
//! - **Rewrites** the body: resolved fields become plain text, everything
//!   else is removed without leaving marker residue
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docfield::{run, TemplateMapping};
//! use serde_json::json;
//!
//! let mapping = TemplateMapping::from_json(r#"{
//!   "DODAVATEL": "supplier.name",
//!   "OSOBA": "contact.first + contact.last",
//!   "PRVNI_POLOZKA": "items[0].label"
//! }"#)?;
//! let data = json!({
//!   "supplier": {"name": "ACME s.r.o."},
//!   "contact": {"first": "Jan", "last": "Novák"},
//!   "items": [{"label": "First"}]
//! });
//!
//! let output = run(&body_xml, &mapping, &data)?;
//! for d in &output.report.diagnostics {
//!     println!("{} {} -> {}", d.kind, d.name, d.action);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                                                             │
//! │  body ──► markup::Document                                  │
//! │              │                                              │
//! │              ├──► locate ──► FieldRecord[]                  │
//! │              │                    │                         │
//! │  mapping + data ──► resolve ──► ResolutionResult            │
//! │              │         (expr + format)  │                   │
//! │              └──► mutate ◄──────────────┘                   │
//! │                     │                                       │
//! │                     └──► body' + RunReport                  │
//! │                                                             │
//! │  optional:  derive::enrich(data)   validate::check_mapping  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod derive;
pub mod engine;
pub mod error;
pub mod expr;
pub mod format;
pub mod locate;
pub mod markup;
pub mod mutate;
pub mod resolve;
pub mod validate;

// Re-exports
pub use config::{
    CountRule, DerivedConfig, DifferenceRule, EngineConfig, FormatConfig, LocateConfig, TotalRule,
    CONFIG_FILE,
};
pub use derive::enrich;
pub use engine::{run, Engine, RunOutput, RunReport};
pub use error::{Error, Result};
pub use expr::{Expression, Path, Segment};
pub use format::{format_value, Rendering, ValueFormatter};
pub use locate::{locate, summarize, FieldKind, FieldRecord, FieldSummary, Locator};
pub use markup::{Document, Element, NodeId};
pub use mutate::{Action, Diagnostic};
pub use resolve::{Resolution, ResolutionResult, ResolutionStatus, Resolver, TemplateMapping};
pub use validate::{check_mapping, MappingIssue, MappingReport, Severity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
