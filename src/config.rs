//! docfield engine configuration
//!
//! Handles loading of `docfield.yaml`. Every field has a default, so an
//! absent file or a partial one is always valid.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up by [`EngineConfig::load_from_dir`]
pub const CONFIG_FILE: &str = "docfield.yaml";

/// Top-level configuration (`docfield.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Value formatting
    #[serde(default)]
    pub format: FormatConfig,

    /// Field location
    #[serde(default)]
    pub locate: LocateConfig,

    /// Derived values injected into the data before filling
    #[serde(default)]
    pub derived: DerivedConfig,
}

/// How resolved values are rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormatConfig {
    /// Text written for a `true` boolean (false renders as empty)
    #[serde(default = "default_true_token")]
    pub true_token: String,

    /// Case-insensitive substrings that mark a path as a money amount
    #[serde(default = "default_currency_hints")]
    pub currency_hints: Vec<String>,

    /// Separator between thousands groups in money amounts
    #[serde(default = "default_thousands_separator")]
    pub thousands_separator: String,

    /// Separator before the two fractional digits of money amounts
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: String,
}

fn default_true_token() -> String {
    "yes".to_string()
}

fn default_currency_hints() -> Vec<String> {
    ["cena", "price", "amount", "currency", "castka", "total"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_thousands_separator() -> String {
    " ".to_string()
}

fn default_decimal_separator() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            true_token: default_true_token(),
            currency_hints: default_currency_hints(),
            thousands_separator: default_thousands_separator(),
            decimal_separator: default_decimal_separator(),
        }
    }
}

/// Which constructs the locator reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocateConfig {
    /// Bookmarks whose name starts with one of these are not fields
    #[serde(default = "default_ignored_bookmarks")]
    pub ignore_bookmark_prefixes: Vec<String>,

    /// Also report bookmarks, content-control tags and `{{name}}` tokens
    #[serde(default = "default_true")]
    pub fallback_syntaxes: bool,
}

fn default_ignored_bookmarks() -> Vec<String> {
    vec!["_".to_string()]
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            ignore_bookmark_prefixes: default_ignored_bookmarks(),
            fallback_syntaxes: true,
        }
    }
}

/// Derived-value preparation, see [`crate::derive`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DerivedConfig {
    /// Object key the derived values are written under
    #[serde(default = "default_derived_target")]
    pub target: String,

    /// Sums over an array field
    #[serde(default)]
    pub totals: Vec<TotalRule>,

    /// Differences between two totals
    #[serde(default)]
    pub differences: Vec<DifferenceRule>,

    /// Array lengths
    #[serde(default)]
    pub counts: Vec<CountRule>,

    /// Add `generated_date`, `generated_time` and `generated_at`
    #[serde(default = "default_true")]
    pub timestamp: bool,
}

fn default_derived_target() -> String {
    "computed".to_string()
}

impl Default for DerivedConfig {
    fn default() -> Self {
        Self {
            target: default_derived_target(),
            totals: Vec::new(),
            differences: Vec::new(),
            counts: Vec::new(),
            timestamp: true,
        }
    }
}

/// `name = sum(items[*].field)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TotalRule {
    pub name: String,
    /// Path to the array
    pub items: String,
    /// Property summed on each element
    pub field: String,
}

/// `name = minuend - subtrahend`, both names of totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DifferenceRule {
    pub name: String,
    pub minuend: String,
    pub subtrahend: String,
}

/// `name = len(items)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CountRule {
    pub name: String,
    pub items: String,
}

impl EngineConfig {
    /// Parse configuration from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_norway::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_yaml(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load `docfield.yaml` from a directory, if present
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let file = dir.join(CONFIG_FILE);
        if !file.exists() {
            return Ok(None);
        }
        Self::load(&file).map(Some)
    }
}
