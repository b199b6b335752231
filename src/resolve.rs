//! Field resolution
//!
//! Pairs the names found in a template with the template's mapping table and
//! evaluates the matching expressions against the data tree.

use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::format::ValueFormatter;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Per-template table `field name -> expression source`, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TemplateMapping(IndexMap<String, String>);

impl TemplateMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the persisted JSON form: an object of strings
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Mapping(e.to_string()))
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.0.insert(name.into(), source.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TemplateMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Outcome class of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Mapped and evaluated; the value may be empty
    Resolved,
    /// No mapping entry
    Unmapped,
    /// Mapping entry does not compile
    EvaluationFailed,
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStatus::Resolved => write!(f, "resolved"),
            ResolutionStatus::Unmapped => write!(f, "unmapped"),
            ResolutionStatus::EvaluationFailed => write!(f, "evaluation failed"),
        }
    }
}

/// Resolution of one field name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub status: ResolutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Compile error message for `EvaluationFailed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Resolution {
    pub fn resolved(value: String) -> Self {
        Self {
            status: ResolutionStatus::Resolved,
            value: Some(value),
            error: None,
        }
    }

    pub fn unmapped() -> Self {
        Self {
            status: ResolutionStatus::Unmapped,
            value: None,
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: ResolutionStatus::EvaluationFailed,
            value: None,
            error: Some(error),
        }
    }

    /// The text to substitute, or `None` when the field must be removed
    pub fn substitution(&self) -> Option<&str> {
        match self.status {
            ResolutionStatus::Resolved => Some(self.value.as_deref().unwrap_or("")),
            ResolutionStatus::Unmapped | ResolutionStatus::EvaluationFailed => None,
        }
    }
}

/// `name -> Resolution`, built fresh per run
pub type ResolutionResult = IndexMap<String, Resolution>;

/// Evaluates mapping entries for located field names
pub struct Resolver<'a> {
    mapping: &'a TemplateMapping,
    formatter: &'a ValueFormatter,
}

impl<'a> Resolver<'a> {
    pub fn new(mapping: &'a TemplateMapping, formatter: &'a ValueFormatter) -> Self {
        Self { mapping, formatter }
    }

    /// Resolve a single name
    pub fn resolve_name(&self, name: &str, data: &Value) -> Resolution {
        let Some(source) = self.mapping.get(name) else {
            return Resolution::unmapped();
        };
        // an entry left blank is not mapped yet
        if source.trim().is_empty() {
            debug!(field = name, "mapping entry is empty");
            return Resolution::unmapped();
        }
        match Expression::compile(source) {
            Ok(expr) => {
                let value = expr.evaluate(data, self.formatter);
                debug!(field = name, expression = source, value = %value, "resolved");
                Resolution::resolved(value)
            }
            Err(e) => {
                warn!(
                    field = name,
                    expression = source,
                    error = %e.detail(),
                    "mapping entry does not compile"
                );
                Resolution::failed(e.to_string())
            }
        }
    }

    /// Resolve each distinct name once, in first-seen order
    pub fn resolve<'n, I>(&self, names: I, data: &Value) -> ResolutionResult
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut result = ResolutionResult::new();
        for name in names {
            if !result.contains_key(name) {
                result.insert(name.to_string(), self.resolve_name(name, data));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping() -> TemplateMapping {
        [
            ("JMENO", "a.b + c.d"),
            ("PRVNI", "items[0].label"),
            ("BROKEN", "items[0.label"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_classification() {
        let mapping = mapping();
        let formatter = ValueFormatter::default();
        let resolver = Resolver::new(&mapping, &formatter);
        let data = json!({"a": {"b": "Jan"}, "c": {"d": "Novák"}, "items": []});

        let names = ["JMENO", "PRVNI", "BROKEN", "LEGACY_UNUSED", "JMENO"];
        let result = resolver.resolve(names, &data);
        assert_eq!(result.len(), 4);
        assert_eq!(result["JMENO"], Resolution::resolved("Jan Novák".into()));
        assert_eq!(result["PRVNI"], Resolution::resolved(String::new()));
        assert_eq!(result["BROKEN"].status, ResolutionStatus::EvaluationFailed);
        assert!(result["BROKEN"].error.is_some());
        assert_eq!(result["LEGACY_UNUSED"], Resolution::unmapped());
    }

    #[test]
    fn test_empty_entry_is_unmapped() {
        let mapping: TemplateMapping = [("POZNAMKA", ""), ("MEZERA", "  ")]
            .into_iter()
            .collect();
        let formatter = ValueFormatter::default();
        let resolver = Resolver::new(&mapping, &formatter);

        let result = resolver.resolve(["POZNAMKA", "MEZERA"], &json!({}));
        assert_eq!(result["POZNAMKA"], Resolution::unmapped());
        assert_eq!(result["MEZERA"], Resolution::unmapped());
        assert_eq!(result["POZNAMKA"].error, None);
    }

    #[test]
    fn test_substitution() {
        assert_eq!(Resolution::resolved(String::new()).substitution(), Some(""));
        assert_eq!(Resolution::unmapped().substitution(), None);
        assert_eq!(Resolution::failed("x".into()).substitution(), None);
    }

    #[test]
    fn test_mapping_json_preserves_order() {
        let mapping = TemplateMapping::from_json(r#"{"Z": "z", "A": "a", "M": "m"}"#).unwrap();
        let names: Vec<&str> = mapping.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Z", "A", "M"]);
    }

    #[test]
    fn test_mapping_json_rejects_non_strings() {
        assert!(matches!(
            TemplateMapping::from_json(r#"{"A": 1}"#),
            Err(Error::Mapping(_))
        ));
        assert!(matches!(
            TemplateMapping::from_json("[]"),
            Err(Error::Mapping(_))
        ));
    }
}
