//! Document mutation
//!
//! Applies resolutions to located fields:
//!
//! - **Resolved**: the first node of the span becomes literal text holding the
//!   value, the rest of the span is deleted.
//! - **Unmapped / EvaluationFailed / never resolved**: the whole span is
//!   deleted, leaving no placeholder and no marker residue.
//!
//! Records are applied one at a time in document order. Spans are looked up
//! again in the live tree for every record, so deletions made for earlier
//! records never shift later ones. A span that no longer resolves is a
//! structural error and aborts the whole transform: mutation runs on a copy
//! of the tree that replaces the caller's only on success.

use crate::error::{Error, Result};
use crate::locate::{run_text, FieldKind, FieldRecord};
use crate::markup::{Document, Element, NodeId};
use crate::resolve::{ResolutionResult, ResolutionStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What happened to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Substituted,
    Removed,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Substituted => write!(f, "substituted"),
            Action::Removed => write!(f, "removed"),
        }
    }
}

/// One entry per processed field record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    pub name: String,
    pub kind: FieldKind,
    pub occurrence_index: usize,
    pub action: Action,
    pub status: ResolutionStatus,
    /// Expression error for fields whose mapping entry failed to compile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Apply `resolutions` to `records` in `doc`.
///
/// On error `doc` is left exactly as it was passed in.
pub fn apply(
    doc: &mut Document,
    records: &[FieldRecord],
    resolutions: &ResolutionResult,
) -> Result<Vec<Diagnostic>> {
    let mut work = doc.clone();
    let mut diagnostics = Vec::with_capacity(records.len());

    for record in records {
        let resolution = resolutions.get(&record.name);
        let status = resolution
            .map(|r| r.status)
            .unwrap_or(ResolutionStatus::Unmapped);
        let substitution = resolution.and_then(|r| r.substitution());

        let action = apply_record(&mut work, record, substitution)?;
        debug!(field = %record.name, kind = %record.kind, action = %action, "applied");

        diagnostics.push(Diagnostic {
            name: record.name.clone(),
            kind: record.kind,
            occurrence_index: record.occurrence_index,
            action,
            status,
            error: resolution.and_then(|r| r.error.clone()),
        });
    }

    *doc = work;
    Ok(diagnostics)
}

fn apply_record(
    doc: &mut Document,
    record: &FieldRecord,
    substitution: Option<&str>,
) -> Result<Action> {
    check_span(doc, record)?;
    let first = record.node_span[0];

    match record.kind {
        FieldKind::Composite => match substitution {
            Some(text) => {
                set_run_text(doc, first, text)?;
                for &id in &record.node_span[1..] {
                    doc.remove(id)?;
                }
                Ok(Action::Substituted)
            }
            None => {
                for &id in &record.node_span {
                    doc.remove(id)?;
                }
                Ok(Action::Removed)
            }
        },
        FieldKind::Bookmark | FieldKind::ContentTag => match substitution {
            Some(text) => {
                let run_name = doc.qualified(record.paragraph, "r");
                let run = doc.replace_with_element(first, Element::new(run_name))?;
                set_run_text(doc, run, text)?;
                Ok(Action::Substituted)
            }
            None => {
                doc.remove(first)?;
                Ok(Action::Removed)
            }
        },
        FieldKind::BraceSyntax => {
            if run_text(doc, first) == record.raw_instruction {
                match substitution {
                    Some(text) => {
                        set_run_text(doc, first, text)?;
                        Ok(Action::Substituted)
                    }
                    None => {
                        doc.remove(first)?;
                        Ok(Action::Removed)
                    }
                }
            } else {
                replace_token(doc, first, &record.raw_instruction, substitution.unwrap_or(""))?;
                Ok(match substitution {
                    Some(_) => Action::Substituted,
                    None => Action::Removed,
                })
            }
        }
    }
}

/// Every span node must still be attached, inside the record's paragraph
fn check_span(doc: &Document, record: &FieldRecord) -> Result<()> {
    if record.node_span.is_empty() {
        return Err(Error::Structure(format!(
            "field '{}' has an empty node span",
            record.name
        )));
    }
    for &id in &record.node_span {
        if !doc.is_live(id) || !is_within(doc, id, record.paragraph) {
            return Err(Error::Structure(format!(
                "node {} of field '{}' is no longer in paragraph {}",
                id, record.name, record.paragraph
            )));
        }
    }
    Ok(())
}

fn is_within(doc: &Document, id: NodeId, ancestor: NodeId) -> bool {
    let mut current = doc.parent(id);
    while let Some(node) = current {
        if node == ancestor {
            return true;
        }
        current = doc.parent(node);
    }
    false
}

/// Replace the content of `run` with `text`; line breaks become `br`
fn set_run_text(doc: &mut Document, run: NodeId, text: &str) -> Result<()> {
    doc.clear_children(run)?;
    let t_name = doc.qualified(run, "t");
    let br_name = doc.qualified(run, "br");

    for (i, line) in lines(text).enumerate() {
        if i > 0 {
            doc.append_element(run, Element::new(br_name.as_str()))?;
            if line.is_empty() {
                continue;
            }
        }
        let t = doc.append_element(run, text_element(&t_name, line))?;
        if !line.is_empty() {
            doc.append_text(t, line)?;
        }
    }
    Ok(())
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn needs_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

fn text_element(name: &str, text: &str) -> Element {
    let element = Element::new(name);
    if needs_preserve(text) {
        element.with_attribute("xml:space", "preserve")
    } else {
        element
    }
}

/// Replace the first `token` in the run's literal text, keeping the rest.
///
/// The text element holding the token keeps its attributes; line breaks in
/// `value` become `br` siblings as they do for whole-run substitutions.
fn replace_token(doc: &mut Document, run: NodeId, token: &str, value: &str) -> Result<()> {
    let t_elements = doc.child_elements(run, "t");
    let holder = t_elements
        .iter()
        .copied()
        .find(|&t| doc.text_content(t).contains(token));

    // a token split over several text elements merges them into the first
    let (target, merged, text) = match holder {
        Some(t) => (t, Vec::new(), doc.text_content(t)),
        None => {
            let full = run_text(doc, run);
            if !full.contains(token) {
                return Err(Error::Structure(format!(
                    "token '{}' is no longer present in run {}",
                    token, run
                )));
            }
            let Some((&first, rest)) = t_elements.split_first() else {
                return Err(Error::Structure(format!("run {} has no text", run)));
            };
            (first, rest.to_vec(), full)
        }
    };

    let replaced = text.replacen(token, value, 1);
    let mut pieces = lines(&replaced);
    let head = pieces.next().unwrap_or_default();
    doc.clear_children(target)?;
    if !head.is_empty() {
        doc.append_text(target, head)?;
    }
    if needs_preserve(head) {
        if let Some(el) = doc.element_mut(target) {
            if el.attr("space").is_none() {
                el.attributes.push(("xml:space".to_string(), "preserve".to_string()));
            }
        }
    }

    let t_name = doc.qualified(target, "t");
    let br_name = doc.qualified(target, "br");
    let mut anchor = target;
    for line in pieces {
        anchor = doc.insert_after(anchor, Element::new(br_name.as_str()))?;
        if !line.is_empty() {
            anchor = doc.insert_after(anchor, text_element(&t_name, line))?;
            doc.append_text(anchor, line)?;
        }
    }

    for t in merged {
        doc.remove(t)?;
    }
    Ok(())
}

/// Give every field marker in the body a run of its own.
///
/// A run may close one field and open the next, or hold a marker next to
/// literal text. Such runs are split so that each element after the first
/// moves into a new sibling run carrying a copy of the run properties.
/// Returns the number of runs split.
pub fn isolate_markers(doc: &mut Document) -> Result<usize> {
    let mut split = 0;
    for run in doc.elements_named("r") {
        let content: Vec<NodeId> = doc
            .children(run)
            .iter()
            .copied()
            .filter(|&c| doc.element(c).is_some() && !doc.is_element(c, "rPr"))
            .collect();
        if content.len() < 2 || !content.iter().any(|&c| doc.marker_type(c).is_some()) {
            continue;
        }
        let Some(element) = doc.element(run).cloned() else {
            continue;
        };
        let props = doc.child_elements(run, "rPr").first().copied();

        let mut anchor = run;
        for &child in &content[1..] {
            let next = doc.insert_after(anchor, element.clone())?;
            if let Some(props) = props {
                doc.copy_into(props, next)?;
            }
            doc.move_to(child, next)?;
            anchor = next;
        }
        split += 1;
    }
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::locate;
    use crate::resolve::Resolution;

    const FIELD: &str = r#"<w:r><w:rPr><w:b/></w:rPr><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText> DOCVARIABLE </w:instrText></w:r><w:r><w:instrText>JMENO \* MERGEFORMAT</w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>«JMENO»</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r>"#;

    fn doc(paragraphs: &str) -> Document {
        Document::parse(&format!(
            r#"<w:document xmlns:w="urn:w"><w:body>{}</w:body></w:document>"#,
            paragraphs
        ))
        .unwrap()
    }

    fn resolutions(entries: &[(&str, Resolution)]) -> ResolutionResult {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn body_of(doc: &Document) -> String {
        let xml = doc.to_xml().unwrap();
        let start = xml.find("<w:body>").unwrap();
        let end = xml.find("</w:body>").unwrap();
        xml[start + 8..end].to_string()
    }

    #[test]
    fn test_substitute_composite() {
        let mut d = doc(&format!("<w:p><w:r><w:t>Jméno: </w:t></w:r>{}</w:p>", FIELD));
        let records = locate(&d);
        let diags = apply(
            &mut d,
            &records,
            &resolutions(&[("JMENO", Resolution::resolved("Jan Novák".into()))]),
        )
        .unwrap();

        assert_eq!(
            body_of(&d),
            "<w:p><w:r><w:t>Jméno: </w:t></w:r><w:r><w:t>Jan Novák</w:t></w:r></w:p>"
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].action, Action::Substituted);
        assert_eq!(diags[0].status, ResolutionStatus::Resolved);
    }

    #[test]
    fn test_remove_unmapped_composite() {
        let mut d = doc(&format!("<w:p>{}<w:r><w:t>x</w:t></w:r></w:p>", FIELD));
        let records = locate(&d);
        let diags = apply(&mut d, &records, &ResolutionResult::new()).unwrap();
        assert_eq!(body_of(&d), "<w:p><w:r><w:t>x</w:t></w:r></w:p>");
        assert_eq!(diags[0].action, Action::Removed);
        assert_eq!(diags[0].status, ResolutionStatus::Unmapped);
    }

    #[test]
    fn test_failed_expression_is_removed_with_error() {
        let mut d = doc(&format!("<w:p>{}</w:p>", FIELD));
        let records = locate(&d);
        let diags = apply(
            &mut d,
            &records,
            &resolutions(&[("JMENO", Resolution::failed("unbalanced '['".into()))]),
        )
        .unwrap();
        assert_eq!(body_of(&d), "<w:p/>");
        assert_eq!(diags[0].action, Action::Removed);
        assert_eq!(diags[0].error.as_deref(), Some("unbalanced '['"));
    }

    #[test]
    fn test_multiline_and_padded_values() {
        let mut d = doc(&format!("<w:p>{}</w:p>", FIELD));
        let records = locate(&d);
        apply(
            &mut d,
            &records,
            &resolutions(&[("JMENO", Resolution::resolved("a\n b".into()))]),
        )
        .unwrap();
        assert_eq!(
            body_of(&d),
            r#"<w:p><w:r><w:t>a</w:t><w:br/><w:t xml:space="preserve"> b</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_two_fields_in_one_paragraph() {
        let second = FIELD.replace("JMENO", "PRIJMENI");
        let mut d = doc(&format!("<w:p>{}<w:r><w:t> </w:t></w:r>{}</w:p>", FIELD, second));
        let records = locate(&d);
        let diags = apply(
            &mut d,
            &records,
            &resolutions(&[("PRIJMENI", Resolution::resolved("Novák".into()))]),
        )
        .unwrap();
        assert_eq!(
            body_of(&d),
            "<w:p><w:r><w:t> </w:t></w:r><w:r><w:t>Novák</w:t></w:r></w:p>"
        );
        let actions: Vec<Action> = diags.iter().map(|d| d.action).collect();
        assert_eq!(actions, vec![Action::Removed, Action::Substituted]);
    }

    #[test]
    fn test_brace_token_inside_text() {
        let mut d = doc("<w:p><w:r><w:t>Dear {{name}}, {{unused}}!</w:t></w:r></w:p>");
        let records = locate(&d);
        apply(
            &mut d,
            &records,
            &resolutions(&[("name", Resolution::resolved("Jana".into()))]),
        )
        .unwrap();
        assert_eq!(body_of(&d), "<w:p><w:r><w:t>Dear Jana, !</w:t></w:r></w:p>");
    }

    #[test]
    fn test_brace_token_split_over_text_elements() {
        let mut d = doc("<w:p><w:r><w:t>a {{na</w:t><w:t>me}} b</w:t></w:r></w:p>");
        let records = locate(&d);
        assert_eq!(records.len(), 1);
        apply(
            &mut d,
            &records,
            &resolutions(&[("name", Resolution::resolved("X".into()))]),
        )
        .unwrap();
        assert_eq!(body_of(&d), "<w:p><w:r><w:t>a X b</w:t></w:r></w:p>");
    }

    #[test]
    fn test_brace_token_inside_text_with_line_breaks() {
        let mut d = doc("<w:p><w:r><w:t>Addr: {{adr}}.</w:t></w:r></w:p>");
        let records = locate(&d);
        apply(
            &mut d,
            &records,
            &resolutions(&[("adr", Resolution::resolved("Line1\r\n Line2".into()))]),
        )
        .unwrap();
        assert_eq!(
            body_of(&d),
            r#"<w:p><w:r><w:t>Addr: Line1</w:t><w:br/><w:t xml:space="preserve"> Line2.</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_brace_token_keeps_preserved_spacing() {
        let mut d = doc(r#"<w:p><w:r><w:t xml:space="preserve">{{a}} </w:t></w:r></w:p>"#);
        let records = locate(&d);
        apply(
            &mut d,
            &records,
            &resolutions(&[("a", Resolution::resolved("x\n".into()))]),
        )
        .unwrap();
        assert_eq!(
            body_of(&d),
            concat!(
                r#"<w:p><w:r><w:t xml:space="preserve">x</w:t>"#,
                r#"<w:br/><w:t xml:space="preserve"> </w:t></w:r></w:p>"#,
            )
        );
    }

    #[test]
    fn test_isolate_markers_splits_shared_runs() {
        let mut d = doc(concat!(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr>"#,
            r#"<w:fldChar w:fldCharType="end"/><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r></w:p>"#,
        ));
        assert_eq!(isolate_markers(&mut d).unwrap(), 1);
        assert_eq!(
            body_of(&d),
            concat!(
                r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:fldChar w:fldCharType="end"/></w:r>"#,
                r#"<w:r><w:rPr><w:b/></w:rPr><w:fldChar w:fldCharType="begin"/></w:r>"#,
                r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r></w:p>"#,
            )
        );
        assert_eq!(isolate_markers(&mut d).unwrap(), 0);
    }

    #[test]
    fn test_bookmark_and_content_tag() {
        let mut d = doc(
            r#"<w:p><w:bookmarkStart w:id="1" w:name="PODPIS"/><w:bookmarkEnd w:id="1"/><w:sdt><w:sdtPr><w:tag w:val="OLD"/></w:sdtPr><w:sdtContent><w:r><w:t>x</w:t></w:r></w:sdtContent></w:sdt></w:p>"#,
        );
        let records = locate(&d);
        apply(
            &mut d,
            &records,
            &resolutions(&[("PODPIS", Resolution::resolved("Ing. Jan Novák".into()))]),
        )
        .unwrap();
        assert_eq!(
            body_of(&d),
            r#"<w:p><w:r><w:t>Ing. Jan Novák</w:t></w:r><w:bookmarkEnd w:id="1"/></w:p>"#
        );
    }

    #[test]
    fn test_stale_span_aborts_and_leaves_document_untouched() {
        let mut d = doc(&format!("<w:p>{}</w:p>", FIELD));
        let records = locate(&d);
        let before = d.to_xml().unwrap();
        // the same record twice: the second application finds its nodes gone
        let doubled = vec![records[0].clone(), records[0].clone()];
        let result = apply(
            &mut d,
            &doubled,
            &resolutions(&[("JMENO", Resolution::resolved("x".into()))]),
        );
        assert!(matches!(result, Err(Error::Structure(_))));
        assert_eq!(d.to_xml().unwrap(), before);
    }
}
