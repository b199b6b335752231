//! Property-based tests for the engine
//!
//! Generates template bodies from a small vocabulary of field constructs and
//! checks the invariants every run must keep.

use docfield::*;
use proptest::prelude::*;
use serde_json::{json, Value};

const NAMES: &[&str] = &["JMENO", "CENA", "CENA_S_DPH", "DATUM", "POLOZKA"];

/// One field construct, optionally split over several instruction runs
#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Field { name: &'static str, split: usize },
    Brace(&'static str),
}

fn render_piece(piece: &Piece) -> String {
    match piece {
        Piece::Text(text) => format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, text),
        Piece::Field { name, split } => {
            let instruction = format!(" DOCVARIABLE {} \\* MERGEFORMAT ", name);
            let cut = (*split).min(instruction.len());
            let (head, tail) = instruction.split_at(cut);
            let mut runs = String::from(r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#);
            for fragment in [head, tail] {
                if !fragment.is_empty() {
                    runs.push_str(&format!(
                        r#"<w:r><w:instrText xml:space="preserve">{}</w:instrText></w:r>"#,
                        fragment
                    ));
                }
            }
            runs.push_str(r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#);
            runs.push_str(&format!("<w:r><w:t>«{}»</w:t></w:r>", name));
            runs.push_str(r#"<w:r><w:fldChar w:fldCharType="end"/></w:r>"#);
            runs
        }
        Piece::Brace(name) => format!("<w:r><w:t>{{{{{}}}}}</w:t></w:r>", name),
    }
}

fn any_piece() -> impl Strategy<Value = Piece> {
    prop_oneof![
        "[a-zA-Z ]{1,8}".prop_map(Piece::Text),
        (prop::sample::select(NAMES), 0usize..40).prop_map(|(name, split)| Piece::Field { name, split }),
        prop::sample::select(NAMES).prop_map(Piece::Brace),
    ]
}

fn any_body() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::collection::vec(any_piece(), 0..5), 1..5).prop_map(|paragraphs| {
        let body: String = paragraphs
            .iter()
            .map(|pieces| {
                let runs: String = pieces.iter().map(render_piece).collect();
                format!("<w:p>{}</w:p>", runs)
            })
            .collect();
        format!(
            r#"<w:document xmlns:w="urn:w"><w:body>{}</w:body></w:document>"#,
            body
        )
    })
}

fn any_mapping() -> impl Strategy<Value = TemplateMapping> {
    prop::sample::subsequence(NAMES.to_vec(), 0..=NAMES.len()).prop_map(|names| {
        names
            .into_iter()
            .map(|name| (name, format!("data.{}", name.to_lowercase())))
            .collect()
    })
}

fn data() -> Value {
    json!({
        "data": {
            "jmeno": "Jan",
            "cena": 1500,
            "cena_s_dph": "1815.5",
            "datum": "2025-02-15",
            "polozka": true
        }
    })
}

proptest! {
    #[test]
    fn test_no_markers_survive(body in any_body(), mapping in any_mapping()) {
        let output = run(&body, &mapping, &data()).unwrap();
        prop_assert_eq!(output.body.matches("fldChar").count(), 0);
        prop_assert!(!output.body.contains("instrText"));
        prop_assert!(!output.body.contains("{{"));
    }

    #[test]
    fn test_one_diagnostic_per_record(body in any_body(), mapping in any_mapping()) {
        let records = locate(&Document::parse(&body).unwrap());
        let output = run(&body, &mapping, &data()).unwrap();
        prop_assert_eq!(output.report.total(), records.len());
        for (record, diag) in records.iter().zip(&output.report.diagnostics) {
            prop_assert_eq!(&record.name, &diag.name);
            prop_assert_eq!(record.kind, diag.kind);
            let expected = if mapping.contains(&record.name) {
                Action::Substituted
            } else {
                Action::Removed
            };
            prop_assert_eq!(diag.action, expected);
        }
    }

    #[test]
    fn test_second_run_is_a_no_op(body in any_body(), mapping in any_mapping()) {
        let first = run(&body, &mapping, &data()).unwrap();
        let second = run(&first.body, &mapping, &data()).unwrap();
        prop_assert_eq!(second.report.total(), 0);
        prop_assert_eq!(second.body, first.body);
    }

    #[test]
    fn test_split_field_keeps_its_full_name(name in prop::sample::select(NAMES), split in 0usize..40) {
        let body = format!(
            r#"<w:document xmlns:w="urn:w"><w:body><w:p>{}</w:p></w:body></w:document>"#,
            render_piece(&Piece::Field { name, split })
        );
        let records = locate(&Document::parse(&body).unwrap());
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(records[0].name.as_str(), name);
    }

    #[test]
    fn test_formatting_is_total(hint in "[a-z_]{0,12}", text in ".*", number in any::<f64>()) {
        let formatter = ValueFormatter::default();
        formatter.format(&hint, &json!(text));
        formatter.format(&hint, &json!(number));
        formatter.format(&hint, &json!([text, number]));
    }
}
