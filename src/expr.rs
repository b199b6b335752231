//! Mapping expressions
//!
//! A mapping entry is either a single data path (`supplier.address.city`,
//! `items[0].label`) or several paths joined with ` + `, whose non-empty
//! results are joined with one space (`person.first + person.last`).
//!
//! Walking a path never fails: a missing key, a `null`, an index past the end
//! of an array or a step into a scalar simply yields no value. Only malformed
//! source text is an error, and that is caught at compile time.

use crate::error::{Error, Result};
use crate::format::ValueFormatter;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Separator that turns an entry into a concatenation
pub const CONCAT_SEPARATOR: &str = " + ";

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Compiled data path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    source: String,
    segments: Vec<Segment>,
}

/// Compiled mapping entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Path(Path),
    Concatenation(Vec<Path>),
}

impl Path {
    /// Compile a single dotted/indexed path
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Error::expression(source, "empty path"));
        }

        let mut segments = Vec::new();
        for part in source.split('.') {
            parse_part(source, part, &mut segments)?;
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Follow the path; `None` when there is no value (null counts as none)
    pub fn lookup<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        let mut current = data;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                // `items.0.label` reads like `items[0].label`
                (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
                (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }
}

fn parse_part(source: &str, part: &str, segments: &mut Vec<Segment>) -> Result<()> {
    if part.is_empty() {
        return Err(Error::expression(source, "empty path segment"));
    }

    let (name, mut rest) = match part.find('[') {
        Some(pos) => part.split_at(pos),
        None => (part, ""),
    };
    if name.contains(']') {
        return Err(Error::expression(source, format!("unbalanced ']' in '{}'", part)));
    }
    if name.is_empty() && rest.is_empty() {
        return Err(Error::expression(source, "empty path segment"));
    }
    if !name.is_empty() {
        segments.push(Segment::Key(name.to_string()));
    }

    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return Err(Error::expression(
                source,
                format!("unexpected '{}' after index in '{}'", rest, part),
            ));
        };
        let Some(close) = inner.find(']') else {
            return Err(Error::expression(source, format!("unbalanced '[' in '{}'", part)));
        };
        let index = &inner[..close];
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::expression(
                source,
                format!("invalid array index '{}' in '{}'", index, part),
            ));
        }
        let index = index
            .parse::<usize>()
            .map_err(|e| Error::expression(source, format!("invalid array index: {}", e)))?;
        segments.push(Segment::Index(index));
        rest = &inner[close + 1..];
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

impl Expression {
    /// Compile a mapping entry
    pub fn compile(source: &str) -> Result<Self> {
        if source.contains(CONCAT_SEPARATOR) {
            let paths = source
                .split(CONCAT_SEPARATOR)
                .map(Path::parse)
                .collect::<Result<Vec<_>>>()?;
            Ok(Expression::Concatenation(paths))
        } else {
            Path::parse(source).map(Expression::Path)
        }
    }

    /// Every path the expression reads
    pub fn paths(&self) -> &[Path] {
        match self {
            Expression::Path(path) => std::slice::from_ref(path),
            Expression::Concatenation(paths) => paths,
        }
    }

    /// Evaluate against `data`; each path's value is formatted on its own
    pub fn evaluate(&self, data: &Value, formatter: &ValueFormatter) -> String {
        let formatted = self.paths().iter().filter_map(|path| {
            path.lookup(data)
                .map(|value| formatter.format(path.source(), value))
        });

        match self {
            Expression::Path(_) => formatted.collect(),
            Expression::Concatenation(_) => formatted
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Expression::compile(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.paths().iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join(CONCAT_SEPARATOR))
    }
}
