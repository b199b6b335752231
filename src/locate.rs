//! Field location
//!
//! Scans a [`Document`] paragraph by paragraph and reports every field
//! construct as a [`FieldRecord`]: the field's name plus the nodes that have
//! to be rewritten together.
//!
//! Composite fields are the `begin … instrText … separate … end` marker
//! sequences word processors emit for `DOCVARIABLE` and `MERGEFIELD`. Their
//! instruction text is routinely split over several runs, so it is gathered
//! across the whole construct before the name is read. Three single-node
//! syntaxes are reported as well: bookmarks, tagged content controls and
//! `{{name}}` tokens in literal text.
//!
//! Records are a snapshot. They hold [`NodeId`]s, not borrowed nodes, and are
//! resolved against the live tree only when the document is mutated.

use crate::config::LocateConfig;
use crate::markup::{Document, MarkerType, NodeId};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// `DOCVARIABLE name`, `MERGEFIELD name` or the quoted forms
static FIELD_INSTRUCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:DOCVARIABLE|MERGEFIELD)\s+(?:"([^"]+)"|([\p{L}\p{N}_|./\-]+))"#)
        .expect("valid regex")
});

/// Field keyword followed by everything up to the first switch
static FIELD_ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:DOCVARIABLE|MERGEFIELD)\s+([^\\"]+)"#).expect("valid regex")
});

static NAME_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{N}_|./\-]+$").expect("valid regex"));

static BRACE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([\w|./\-]+)\}\}").expect("valid regex"));

/// Syntax a field was written in
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Marker sequence, possibly spanning several runs
    Composite,
    /// `bookmarkStart` with a name
    Bookmark,
    /// Content control carrying a tag
    ContentTag,
    /// `{{name}}` in literal text
    BraceSyntax,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Composite => write!(f, "composite"),
            FieldKind::Bookmark => write!(f, "bookmark"),
            FieldKind::ContentTag => write!(f, "content-tag"),
            FieldKind::BraceSyntax => write!(f, "brace"),
        }
    }
}

/// One located field construct
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRecord {
    /// Data-binding name as written in the template
    pub name: String,
    pub kind: FieldKind,
    /// Paragraph that contains the whole construct
    pub paragraph: NodeId,
    /// Nodes rewritten together, in document order; never empty
    pub node_span: Vec<NodeId>,
    /// Instruction fragments joined as found (brace token or tag for the
    /// single-node kinds)
    pub raw_instruction: String,
    /// Position among records sharing `name` and `kind`
    pub occurrence_index: usize,
}

/// Distinct field with its number of occurrences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSummary {
    pub name: String,
    pub kind: FieldKind,
    pub count: usize,
}

/// Paragraph content relevant to field location, in document order
#[derive(Debug, Clone)]
enum Item {
    Run(NodeId),
    Bookmark(NodeId, String),
    ContentTag(NodeId, String),
}

impl Item {
    fn node(&self) -> NodeId {
        match self {
            Item::Run(id) | Item::Bookmark(id, _) | Item::ContentTag(id, _) => *id,
        }
    }
}

/// A terminated marker sequence inside one paragraph
#[derive(Debug)]
struct Construct {
    span: Vec<NodeId>,
    fragments: Vec<String>,
}

/// Field locator
#[derive(Debug, Clone)]
pub struct Locator {
    ignore_bookmark_prefixes: Vec<String>,
    fallback_syntaxes: bool,
}

impl Default for Locator {
    fn default() -> Self {
        Self::new(&LocateConfig::default())
    }
}

/// Locate with the default configuration
pub fn locate(doc: &Document) -> Vec<FieldRecord> {
    Locator::default().locate(doc)
}

impl Locator {
    pub fn new(config: &LocateConfig) -> Self {
        Self {
            ignore_bookmark_prefixes: config.ignore_bookmark_prefixes.clone(),
            fallback_syntaxes: config.fallback_syntaxes,
        }
    }

    /// All field records of the document, in document order
    pub fn locate(&self, doc: &Document) -> Vec<FieldRecord> {
        let mut records = Vec::new();
        for paragraph in doc.elements_named("p") {
            records.extend(self.scan_paragraph(doc, paragraph));
        }

        let mut seen: HashMap<(String, FieldKind), usize> = HashMap::new();
        for record in &mut records {
            let counter = seen.entry((record.name.clone(), record.kind)).or_insert(0);
            record.occurrence_index = *counter;
            *counter += 1;
        }

        debug!(records = records.len(), "located fields");
        records
    }

    fn scan_paragraph(&self, doc: &Document, paragraph: NodeId) -> Vec<FieldRecord> {
        let mut items = Vec::new();
        self.collect_items(doc, paragraph, &mut items);
        let position: HashMap<NodeId, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.node(), i))
            .collect();

        let runs: Vec<NodeId> = items
            .iter()
            .filter_map(|item| match item {
                Item::Run(id) => Some(*id),
                _ => None,
            })
            .collect();

        let mut records = Vec::new();
        let mut covered: HashSet<NodeId> = HashSet::new();

        for construct in find_constructs(doc, &runs) {
            let raw_instruction = construct.fragments.concat();
            match best_name(&construct.fragments) {
                Some(name) => {
                    covered.extend(construct.span.iter().copied());
                    debug!(field = %name, runs = construct.span.len(), "composite field");
                    records.push(FieldRecord {
                        name,
                        kind: FieldKind::Composite,
                        paragraph,
                        node_span: construct.span,
                        raw_instruction,
                        occurrence_index: 0,
                    });
                }
                None => {
                    debug!(instruction = %raw_instruction, "field construct without a data name")
                }
            }
        }

        if self.fallback_syntaxes {
            for item in &items {
                match item {
                    Item::Bookmark(id, name) => {
                        records.push(single(name, FieldKind::Bookmark, paragraph, *id, name))
                    }
                    Item::ContentTag(id, tag) => {
                        records.push(single(tag, FieldKind::ContentTag, paragraph, *id, tag))
                    }
                    Item::Run(id) if !covered.contains(id) => {
                        let text = run_text(doc, *id);
                        for caps in BRACE_TOKEN.captures_iter(&text) {
                            let kind = FieldKind::BraceSyntax;
                            records.push(single(&caps[1], kind, paragraph, *id, &caps[0]));
                        }
                    }
                    Item::Run(_) => {}
                }
            }
        }

        records.sort_by_key(|r| position.get(&r.node_span[0]).copied().unwrap_or(usize::MAX));
        records
    }

    fn collect_items(&self, doc: &Document, node: NodeId, out: &mut Vec<Item>) {
        for &child in doc.children(node) {
            let Some(el) = doc.element(child) else {
                continue;
            };
            match el.local_name() {
                "r" => out.push(Item::Run(child)),
                // a nested paragraph is scanned on its own
                "p" => {}
                "bookmarkStart" if self.fallback_syntaxes => {
                    if let Some(name) = el.attr("name") {
                        if !self.is_ignored_bookmark(name) {
                            out.push(Item::Bookmark(child, name.to_string()));
                        }
                    }
                }
                "sdt" if self.fallback_syntaxes => match content_tag(doc, child) {
                    Some(tag) => out.push(Item::ContentTag(child, tag)),
                    None => self.collect_items(doc, child, out),
                },
                _ => self.collect_items(doc, child, out),
            }
        }
    }

    fn is_ignored_bookmark(&self, name: &str) -> bool {
        self.ignore_bookmark_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
    }
}

fn single(name: &str, kind: FieldKind, paragraph: NodeId, node: NodeId, raw: &str) -> FieldRecord {
    FieldRecord {
        name: name.to_string(),
        kind,
        paragraph,
        node_span: vec![node],
        raw_instruction: raw.to_string(),
        occurrence_index: 0,
    }
}

/// Tag value of a content control (`sdt/sdtPr/tag@val`)
fn content_tag(doc: &Document, sdt: NodeId) -> Option<String> {
    doc.child_elements(sdt, "sdtPr")
        .into_iter()
        .flat_map(|pr| doc.child_elements(pr, "tag"))
        .find_map(|tag| doc.element(tag)?.attr("val").map(str::to_string))
        .filter(|tag| !tag.is_empty())
}

/// Literal text of a run (its direct `t` children)
pub(crate) fn run_text(doc: &Document, run: NodeId) -> String {
    doc.child_elements(run, "t")
        .into_iter()
        .map(|t| doc.text_content(t))
        .collect()
}

/// Walk the runs of one paragraph and cut them into terminated constructs.
///
/// A construct opens at a `begin` marker and closes at the next `end` marker;
/// a `begin` seen while a construct is open belongs to that construct. A
/// construct still open when the paragraph ends is dropped. A run holding the
/// `end` of one construct and the `begin` of the next lands in both spans;
/// the engine splits such runs before it mutates anything.
fn find_constructs(doc: &Document, runs: &[NodeId]) -> Vec<Construct> {
    let mut constructs = Vec::new();
    let mut open: Option<(usize, Vec<String>)> = None;

    for (idx, &run) in runs.iter().enumerate() {
        for &child in doc.children(run) {
            match doc.marker_type(child) {
                Some(MarkerType::Begin) if open.is_none() => {
                    open = Some((idx, Vec::new()));
                }
                Some(MarkerType::End) => {
                    if let Some((start, fragments)) = open.take() {
                        constructs.push(Construct {
                            span: runs[start..=idx].to_vec(),
                            fragments,
                        });
                    }
                }
                Some(_) => {}
                None => {
                    if doc.is_element(child, "instrText") {
                        if let Some((_, fragments)) = open.as_mut() {
                            fragments.push(doc.text_content(child));
                        }
                    }
                }
            }
        }
    }

    if let Some((_, fragments)) = open {
        warn!(instruction = %fragments.concat(), "dropping unterminated field");
    }
    constructs
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strict_name(instruction: &str) -> Option<String> {
    let caps = FIELD_INSTRUCTION.captures(instruction)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Name read across whitespace, up to the first switch
fn joined_name(instruction: &str) -> Option<String> {
    let caps = FIELD_ARGUMENT.captures(instruction)?;
    let joined: String = caps[1].split_whitespace().collect();
    Some(joined).filter(|name| NAME_TOKEN.is_match(name))
}

/// Candidate names for one construct, in preference order
fn candidates(fragments: &[String]) -> Vec<String> {
    let whole = collapse_whitespace(&fragments.concat());
    let mut out = Vec::new();
    let mut push = |name: Option<String>| {
        if let Some(name) = name {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    };

    push(strict_name(&whole));
    push(joined_name(&whole));
    for fragment in fragments {
        push(strict_name(&collapse_whitespace(fragment)));
    }
    out
}

/// Drop every candidate that is a strict prefix of another; first survivor wins
fn best_name(fragments: &[String]) -> Option<String> {
    let names = candidates(fragments);
    names
        .iter()
        .find(|name| {
            !names
                .iter()
                .any(|other| other.len() > name.len() && other.starts_with(name.as_str()))
        })
        .cloned()
}

/// One entry per distinct `(name, kind)`, sorted by name then kind
pub fn summarize(records: &[FieldRecord]) -> Vec<FieldSummary> {
    let mut counts: HashMap<(&str, FieldKind), usize> = HashMap::new();
    for record in records {
        *counts.entry((record.name.as_str(), record.kind)).or_insert(0) += 1;
    }
    let mut summary: Vec<FieldSummary> = counts
        .into_iter()
        .map(|((name, kind), count)| FieldSummary {
            name: name.to_string(),
            kind,
            count,
        })
        .collect();
    summary.sort_by(|a, b| a.name.cmp(&b.name).then(a.kind.cmp(&b.kind)));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(paragraphs: &str) -> Document {
        Document::parse(&format!(
            r#"<w:document xmlns:w="urn:w"><w:body>{}</w:body></w:document>"#,
            paragraphs
        ))
        .unwrap()
    }

    fn field(instr: &[&str], result: &str) -> String {
        let mut xml = String::from(r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#);
        for part in instr {
            xml.push_str(&format!(
                r#"<w:r><w:instrText xml:space="preserve">{}</w:instrText></w:r>"#,
                part
            ));
        }
        xml.push_str(&format!(
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>{}</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r>"#,
            result
        ));
        xml
    }

    fn names(records: &[FieldRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_single_run_instruction() {
        let instruction = [" DOCVARIABLE CISLO \\* MERGEFORMAT "];
        let doc = body(&format!("<w:p>{}</w:p>", field(&instruction, "«CISLO»")));
        let records = locate(&doc);
        assert_eq!(names(&records), vec!["CISLO"]);
        let record = &records[0];
        assert_eq!(record.kind, FieldKind::Composite);
        assert_eq!(record.node_span.len(), 5);
        assert_eq!(record.raw_instruction, " DOCVARIABLE CISLO \\* MERGEFORMAT ");
    }

    #[test]
    fn test_fragmented_instruction() {
        let doc = body(&format!(
            "<w:p>{}</w:p>",
            field(&[" DOCVARIABLE ", "|DOCX.D", "TELEFON", " \\* MERGEFORMAT"], "x")
        ));
        assert_eq!(names(&locate(&doc)), vec!["|DOCX.DTELEFON"]);
    }

    #[test]
    fn test_fragment_prefix_filter() {
        let doc = body(&format!(
            "<w:p>{}</w:p>",
            field(&[" DOCVARIABLE TERMIN_D", " ODANI \\* MERGEFORMAT"], "x")
        ));
        let records = locate(&doc);
        assert_eq!(names(&records), vec!["TERMIN_DODANI"]);
    }

    #[test]
    fn test_distinct_fields_sharing_a_prefix_are_kept() {
        let doc = body(&format!(
            "<w:p>{}{}</w:p>",
            field(&[" MERGEFIELD CENA "], "a"),
            field(&[" MERGEFIELD CENA_S_DPH "], "b")
        ));
        assert_eq!(names(&locate(&doc)), vec!["CENA", "CENA_S_DPH"]);
    }

    #[test]
    fn test_quoted_name() {
        let doc = body(&format!(
            "<w:p>{}</w:p>",
            field(&[r#" DOCVARIABLE "nazev pole" \* MERGEFORMAT"#], "x")
        ));
        assert_eq!(names(&locate(&doc)), vec!["nazev pole"]);
    }

    #[test]
    fn test_case_preserved_and_keyword_case_insensitive() {
        let doc = body(&format!("<w:p>{}</w:p>", field(&[" mergefield Dodavatel.Nazev "], "x")));
        assert_eq!(names(&locate(&doc)), vec!["Dodavatel.Nazev"]);
    }

    #[test]
    fn test_unterminated_field_is_dropped() {
        let doc = body(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText> DOCVARIABLE A </w:instrText></w:r></w:p>
               <w:p><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
        );
        assert!(locate(&doc).is_empty());
    }

    #[test]
    fn test_cross_paragraph_fragments_do_not_combine() {
        let doc = body(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/><w:instrText> DOCVARIABLE TERMIN_</w:instrText></w:r></w:p>
               <w:p><w:r><w:instrText>DODANI </w:instrText><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
        );
        assert!(locate(&doc).is_empty());
    }

    #[test]
    fn test_begin_in_the_run_of_the_previous_end() {
        let doc = body(concat!(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText> DOCVARIABLE A </w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="end"/><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText> DOCVARIABLE B </w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
        ));
        let records = locate(&doc);
        assert_eq!(names(&records), vec!["A", "B"]);
        assert_eq!(records[0].node_span.last(), records[1].node_span.first());
    }

    #[test]
    fn test_non_data_fields_are_ignored() {
        let doc = body(&format!("<w:p>{}</w:p>", field(&[" PAGE "], "1")));
        assert!(locate(&doc).is_empty());
    }

    #[test]
    fn test_occurrence_index() {
        let doc = body(&format!(
            "<w:p>{}</w:p><w:p>{}{}</w:p>",
            field(&[" DOCVARIABLE A "], "a"),
            field(&[" DOCVARIABLE B "], "b"),
            field(&[" DOCVARIABLE A "], "a")
        ));
        let records = locate(&doc);
        let indexed: Vec<(&str, usize)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.occurrence_index))
            .collect();
        assert_eq!(indexed, vec![("A", 0), ("B", 0), ("A", 1)]);
    }

    #[test]
    fn test_fallback_syntaxes() {
        let doc = body(
            r#"<w:p>
                 <w:bookmarkStart w:id="0" w:name="_GoBack"/>
                 <w:bookmarkStart w:id="1" w:name="PODPIS"/>
                 <w:r><w:t>Vážený {{jmeno}}, dne {{datum}}</w:t></w:r>
                 <w:sdt><w:sdtPr><w:tag w:val="dodavatel.nazev"/></w:sdtPr><w:sdtContent><w:r><w:t>…</w:t></w:r></w:sdtContent></w:sdt>
               </w:p>"#,
        );
        let records = locate(&doc);
        let kinds: Vec<(&str, FieldKind)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("PODPIS", FieldKind::Bookmark),
                ("jmeno", FieldKind::BraceSyntax),
                ("datum", FieldKind::BraceSyntax),
                ("dodavatel.nazev", FieldKind::ContentTag),
            ]
        );
        assert_eq!(records[1].raw_instruction, "{{jmeno}}");
    }

    #[test]
    fn test_fallback_syntaxes_can_be_disabled() {
        let doc = body(r#"<w:p><w:bookmarkStart w:id="1" w:name="PODPIS"/><w:r><w:t>{{x}}</w:t></w:r></w:p>"#);
        let locator = Locator::new(&LocateConfig {
            fallback_syntaxes: false,
            ..LocateConfig::default()
        });
        assert!(locator.locate(&doc).is_empty());
    }

    #[test]
    fn test_fields_inside_hyperlink_wrappers() {
        let doc = body(&format!(
            "<w:p><w:hyperlink>{}</w:hyperlink></w:p>",
            field(&[" MERGEFIELD email "], "x")
        ));
        let records = locate(&doc);
        assert_eq!(names(&records), vec!["email"]);
        assert_eq!(records[0].node_span.len(), 5);
    }

    #[test]
    fn test_brace_token_inside_composite_is_not_reported_twice() {
        let doc = body(&format!("<w:p>{}</w:p>", field(&[" DOCVARIABLE A "], "{{A}}")));
        let records = locate(&doc);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, FieldKind::Composite);
    }

    #[test]
    fn test_summarize() {
        let doc = body(&format!(
            "<w:p>{}{}</w:p><w:p><w:r><w:t>{{{{B}}}}</w:t></w:r></w:p>",
            field(&[" DOCVARIABLE B "], "b"),
            field(&[" DOCVARIABLE B "], "b")
        ));
        let summary = summarize(&locate(&doc));
        assert_eq!(
            summary,
            vec![
                FieldSummary { name: "B".into(), kind: FieldKind::Composite, count: 2 },
                FieldSummary { name: "B".into(), kind: FieldKind::BraceSyntax, count: 1 },
            ]
        );
    }
}
