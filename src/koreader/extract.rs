//! Highlight extraction from a loaded annotation document

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::models::{
    AnnotationDocument, AnnotationEntries, Extraction, ExtractionWarning, Highlight, HighlightSlot,
    WarningKind,
};
use super::position::PositionKey;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The fields of a KOReader entry this crate reads. Extra keys are ignored.
#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    chapter: Option<Value>,
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default)]
    drawer: Option<String>,
    #[serde(default)]
    highlighted: Option<Value>,
    #[serde(default)]
    pos0: Option<Value>,
    #[serde(default)]
    pos1: Option<Value>,
    #[serde(default)]
    page: Option<Value>,
    #[serde(default)]
    pageno: Option<Value>,
}

#[derive(Clone, Copy, PartialEq)]
enum Form {
    Annotations,
    Highlight,
    Bookmarks,
}

/// Extract the highlights of a document in reading order.
///
/// Bad entries are skipped and reported in `Extraction::warnings`; this
/// function never fails and never logs.
pub fn extract(doc: &AnnotationDocument) -> Extraction {
    let mut extraction = Extraction::default();

    let candidates: Vec<(usize, &Value)> = match &doc.entries {
        AnnotationEntries::Annotations(entries) | AnnotationEntries::Bookmarks(entries) => {
            entries.iter().enumerate().map(|(i, e)| (i + 1, e)).collect()
        }
        AnnotationEntries::Highlight(slots) => {
            let mut chosen = Vec::new();
            let mut seen = 0;
            for slot in slots {
                if let Some((offset, out_of_order)) = authoritative_entry(slot) {
                    let ordinal = seen + offset + 1;
                    if out_of_order {
                        extraction.warnings.push(ExtractionWarning {
                            ordinal,
                            kind: WarningKind::OutOfOrderAmendment { index: slot.index },
                        });
                    }
                    chosen.push((ordinal, &slot.entries[offset]));
                }
                seen += slot.entries.len();
            }
            chosen
        }
    };

    let form = match doc.entries {
        AnnotationEntries::Annotations(_) => Form::Annotations,
        AnnotationEntries::Highlight(_) => Form::Highlight,
        AnnotationEntries::Bookmarks(_) => Form::Bookmarks,
    };

    let mut highlights: Vec<Highlight> = Vec::new();
    let mut by_position: HashMap<(String, String), usize> = HashMap::new();

    for (ordinal, value) in candidates {
        match to_highlight(value, form, ordinal, &doc.meta.book_id) {
            Ok(highlight) => {
                let key = (highlight.position_start.clone(), highlight.position_end.clone());
                // Same position again: the later record amends the earlier one
                match by_position.get(&key) {
                    Some(&slot) => highlights[slot] = highlight,
                    None => {
                        by_position.insert(key, highlights.len());
                        highlights.push(highlight);
                    }
                }
            }
            Err(kind) => extraction.warnings.push(ExtractionWarning { ordinal, kind }),
        }
    }

    extraction.ordered_by_position = sort_by_position(&mut highlights);
    extraction.highlights = highlights;
    extraction
}

/// Pick the version of a highlight that wins.
///
/// Returns the entry's offset in the slot and whether the versions were out
/// of timestamp order. In-order versions resolve to the last one; otherwise
/// the latest timestamp wins, later entries winning ties.
fn authoritative_entry(slot: &HighlightSlot) -> Option<(usize, bool)> {
    let last = slot.entries.len().checked_sub(1)?;

    let timestamps: Vec<Option<NaiveDateTime>> = slot
        .entries
        .iter()
        .map(|e| e.get("datetime").and_then(Value::as_str).and_then(parse_datetime))
        .collect();

    let known: Vec<NaiveDateTime> = timestamps.iter().flatten().copied().collect();
    if known.windows(2).all(|w| w[0] <= w[1]) {
        return Some((last, false));
    }

    let mut best: Option<(usize, NaiveDateTime)> = None;
    for (i, ts) in timestamps.iter().enumerate() {
        if let Some(ts) = ts {
            if best.map_or(true, |(_, b)| *ts >= b) {
                best = Some((i, *ts));
            }
        }
    }
    best.map(|(i, _)| (i, true))
}

fn to_highlight(value: &Value, form: Form, ordinal: usize, book_id: &str) -> Result<Highlight, WarningKind> {
    if !value.is_object() {
        return Err(WarningKind::Malformed("not a table".to_string()));
    }
    let raw: RawEntry =
        serde_json::from_value(value.clone()).map_err(|e| WarningKind::Malformed(e.to_string()))?;

    let text = match form {
        Form::Bookmarks => {
            if !is_truthy(raw.highlighted.as_ref()) {
                return Err(WarningKind::NotHighlighted);
            }
            raw.notes.or(raw.text)
        }
        Form::Annotations | Form::Highlight => raw.text,
    };

    let text = normalize_text(text.as_deref().unwrap_or(""));
    if text.is_empty() {
        return Err(WarningKind::EmptyText);
    }

    let start = raw.pos0.as_ref().and_then(position_token);
    let end = raw.pos1.as_ref().and_then(position_token);
    let (position_start, position_end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        (Some(p), None) | (None, Some(p)) => (p.clone(), p),
        (None, None) => {
            let p = raw
                .page
                .as_ref()
                .and_then(position_token)
                .unwrap_or_else(|| format!("#{}", ordinal));
            (p.clone(), p)
        }
    };

    let page = raw
        .pageno
        .as_ref()
        .and_then(as_page_number)
        .or_else(|| raw.page.as_ref().and_then(page_from_token))
        .or_else(|| raw.pos0.as_ref().and_then(page_from_token));

    let chapter = raw
        .chapter
        .and_then(|c| match c {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    Ok(Highlight {
        book_id: book_id.to_string(),
        chapter,
        page,
        position_start,
        position_end,
        text,
        timestamp: raw.datetime.as_deref().and_then(parse_datetime),
        datetime: raw.datetime.filter(|d| !d.trim().is_empty()),
        drawer_style: raw.drawer,
    })
}

/// Collapse line-wrap artifacts and whitespace runs, trim the ends
pub fn normalize_text(text: &str) -> String {
    static HYPHEN_WRAP: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let hyphen_wrap = HYPHEN_WRAP
        .get_or_init(|| Regex::new(r"(\p{L})-[ \t]*\r?\n[ \t]*(\p{Ll})").expect("valid regex"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let text = text.replace('\u{00AD}', "");
    let text = hyphen_wrap.replace_all(&text, "$1$2");
    whitespace.replace_all(&text, " ").trim().to_string()
}

/// Lua truthiness: everything but `nil` and `false`
fn is_truthy(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

fn position_token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => {
            // PDF positions: { page = 12, x = 56.0, y = 340.5 }
            let page = map.get("page").and_then(Value::as_u64)?;
            let coord = |k: &str| map.get(k).and_then(Value::as_f64).unwrap_or(0.0);
            Some(format!("pdf:{}:{}:{}", page, coord("y"), coord("x")))
        }
        _ => None,
    }
}

fn as_page_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Page of a position: a number, a PDF position table, or the
/// `DocFragment[N]` of an XPointer
fn page_from_token(value: &Value) -> Option<u32> {
    static DOC_FRAGMENT: OnceLock<Regex> = OnceLock::new();
    let doc_fragment = DOC_FRAGMENT.get_or_init(|| Regex::new(r"DocFragment\[(\d+)\]").expect("valid regex"));

    match value {
        Value::String(s) => doc_fragment
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        Value::Object(map) => map.get("page").and_then(as_page_number),
        other => as_page_number(other),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT).ok()
}

/// Sort into reading order when every position supports it.
///
/// Returns false, leaving source order untouched, when a position cannot be
/// parsed or two neighbours cannot be compared structurally.
fn sort_by_position(highlights: &mut Vec<Highlight>) -> bool {
    let keys: Option<Vec<PositionKey>> = highlights
        .iter()
        .map(|h| PositionKey::parse(&h.position_start))
        .collect();
    let Some(keys) = keys else {
        return false;
    };

    let mut order: Vec<usize> = (0..highlights.len()).collect();
    order.sort_by(|&a, &b| keys[a].sort_cmp(&keys[b]));

    if !order.windows(2).all(|w| keys[w[0]].comparable(&keys[w[1]])) {
        return false;
    }

    let mut slots: Vec<Option<Highlight>> = highlights.drain(..).map(Some).collect();
    highlights.extend(order.into_iter().filter_map(|i| slots[i].take()));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::koreader::loader::parse_document;
    use std::path::Path;

    fn doc(content: &str) -> AnnotationDocument {
        parse_document(content, Path::new("book.sdr/metadata.epub.lua")).unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  exam-\n  ple  text\n\nhere "), "example text here");
        assert_eq!(normalize_text("soft\u{00AD}hyphen"), "softhyphen");
        // A real hyphen before a capital stays
        assert_eq!(normalize_text("New-\nYork"), "New- York");
        assert_eq!(normalize_text(" \n\t "), "");
    }

    #[test]
    fn test_highlight_form_in_position_order() {
        let extraction = extract(&doc(
            r#"return { ["highlight"] = {
    [77] = { [1] = { ["pos0"] = "/body/DocFragment[10]/body/p[1]/text().0", ["pos1"] = "/body/DocFragment[10]/body/p[1]/text().9", ["text"] = "third" } },
    [75] = { [1] = { ["pos0"] = "/body/DocFragment[9]/body/p[2]/text().0", ["pos1"] = "/body/DocFragment[9]/body/p[2]/text().5", ["text"] = "first" } },
    [76] = { [1] = { ["pos0"] = "/body/DocFragment[9]/body/p[7]/text().3", ["pos1"] = "/body/DocFragment[9]/body/p[7]/text().8", ["text"] = "second", ["drawer"] = "lighten" } },
} }"#,
        ));

        let texts: Vec<&str> = extraction.highlights.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(extraction.ordered_by_position);
        assert!(extraction.warnings.is_empty());
        assert_eq!(extraction.highlights[1].drawer_style.as_deref(), Some("lighten"));
        assert_eq!(extraction.highlights[0].page, Some(9));
    }

    #[test]
    fn test_last_version_wins() {
        let extraction = extract(&doc(
            r#"return { ["highlight"] = { [77] = {
    [1] = { ["datetime"] = "2024-01-01 10:00:00", ["pos0"] = "a", ["pos1"] = "b", ["text"] = "draft" },
    [2] = { ["datetime"] = "2024-01-02 10:00:00", ["pos0"] = "a", ["pos1"] = "b", ["text"] = "final" },
} } }"#,
        ));
        assert_eq!(extraction.highlights.len(), 1);
        assert_eq!(extraction.highlights[0].text, "final");
        assert!(extraction.warnings.is_empty());
    }

    #[test]
    fn test_out_of_order_versions_pick_latest_and_warn() {
        let extraction = extract(&doc(
            r#"return { ["highlight"] = { [12] = {
    [1] = { ["datetime"] = "2024-03-05 10:00:00", ["text"] = "newest" },
    [2] = { ["datetime"] = "2024-01-01 10:00:00", ["text"] = "older" },
} } }"#,
        ));
        assert_eq!(extraction.highlights.len(), 1);
        assert_eq!(extraction.highlights[0].text, "newest");
        assert_eq!(
            extraction.warnings,
            vec![ExtractionWarning { ordinal: 1, kind: WarningKind::OutOfOrderAmendment { index: 12 } }]
        );
    }

    #[test]
    fn test_bookmarks_skip_non_highlights() {
        let extraction = extract(&doc(
            r#"return { ["bookmarks"] = {
    [1] = { ["highlighted"] = true, ["notes"] = "The factors that help boost happiness", ["page"] = "/body/DocFragment[12]/body/p[1]/text().0", ["chapter"] = "3. The Water Premium", ["datetime"] = "2021-02-15 14:28:25" },
    [2] = { ["highlighted"] = false, ["notes"] = "Page 40 bookmark", ["page"] = "/body/DocFragment[13]/body/p[1]/text().0" },
    [3] = { ["notes"] = "No marker at all" },
} }"#,
        ));

        assert_eq!(extraction.highlights.len(), 1);
        let h = &extraction.highlights[0];
        assert_eq!(h.text, "The factors that help boost happiness");
        assert_eq!(h.page, Some(12));
        assert_eq!(h.chapter.as_deref(), Some("3. The Water Premium"));
        assert_eq!(h.datetime.as_deref(), Some("2021-02-15 14:28:25"));
        assert!(h.timestamp.is_some());

        let kinds: Vec<&WarningKind> = extraction.warnings.iter().map(|w| &w.kind).collect();
        assert_eq!(kinds, vec![&WarningKind::NotHighlighted, &WarningKind::NotHighlighted]);
    }

    #[test]
    fn test_malformed_and_empty_entries_are_skipped() {
        let extraction = extract(&doc(
            r#"return { ["annotations"] = {
    [1] = "not a table",
    [2] = { ["text"] = 42 },
    [3] = { ["text"] = "   \n  " },
    [4] = { ["text"] = "kept", ["pageno"] = 14, ["pos0"] = "/body/DocFragment[3]/body/p[1]/text().0", ["pos1"] = "/body/DocFragment[3]/body/p[1]/text().4" },
} }"#,
        ));

        assert_eq!(extraction.highlights.len(), 1);
        assert_eq!(extraction.highlights[0].page, Some(14));
        assert_eq!(extraction.warnings.len(), 3);
        assert!(matches!(extraction.warnings[0].kind, WarningKind::Malformed(_)));
        assert!(matches!(extraction.warnings[1].kind, WarningKind::Malformed(_)));
        assert_eq!(extraction.warnings[2].kind, WarningKind::EmptyText);
        assert_eq!(extraction.warnings[2].ordinal, 3);
    }

    #[test]
    fn test_duplicate_positions_collapse() {
        let extraction = extract(&doc(
            r#"return { ["annotations"] = {
    [1] = { ["text"] = "one", ["pos0"] = "/body/p[1].0", ["pos1"] = "/body/p[1].3" },
    [2] = { ["text"] = "two", ["pos0"] = "/body/p[2].0", ["pos1"] = "/body/p[2].3" },
    [3] = { ["text"] = "one, edited", ["pos0"] = "/body/p[1].0", ["pos1"] = "/body/p[1].3" },
} }"#,
        ));
        let texts: Vec<&str> = extraction.highlights.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["one, edited", "two"]);
    }

    #[test]
    fn test_unorderable_positions_keep_source_order() {
        let extraction = extract(&doc(
            r#"return { ["annotations"] = {
    [1] = { ["text"] = "later in book", ["pos0"] = "/body/DocFragment[5]/body/p[1].0", ["pos1"] = "x" },
    [2] = { ["text"] = "no position" },
} }"#,
        ));
        assert!(!extraction.ordered_by_position);
        let texts: Vec<&str> = extraction.highlights.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["later in book", "no position"]);
        assert_eq!(extraction.highlights[1].position_start, "#2");
    }

    #[test]
    fn test_pdf_positions() {
        let extraction = extract(&doc(
            r#"return { ["annotations"] = {
    [1] = { ["text"] = "lower", ["pos0"] = { ["page"] = 3, ["x"] = 10, ["y"] = 500.5 }, ["pos1"] = { ["page"] = 3, ["x"] = 90, ["y"] = 510 } },
    [2] = { ["text"] = "upper", ["pos0"] = { ["page"] = 3, ["x"] = 10, ["y"] = 100 }, ["pos1"] = { ["page"] = 3, ["x"] = 90, ["y"] = 110 } },
} }"#,
        ));
        let texts: Vec<&str> = extraction.highlights.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["upper", "lower"]);
        assert_eq!(extraction.highlights[1].position_start, "pdf:3:500.5:10");
    }

    #[test]
    fn test_never_more_highlights_than_entries() {
        let d = doc(
            r#"return { ["highlight"] = {
    [1] = { [1] = { ["text"] = "a" }, [2] = { ["text"] = "a2" } },
    [2] = { [1] = { ["text"] = "" } },
    [3] = {},
} }"#,
        );
        let extraction = extract(&d);
        assert!(extraction.highlights.len() <= d.entries.entry_count());
        assert_eq!(extraction.highlights.len(), 1);
        assert_eq!(extraction.highlights[0].text, "a2");
    }
}
