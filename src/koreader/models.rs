//! Data models for KOReader annotation documents

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Book-level metadata shared by every highlight and card of a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMeta {
    /// `partial_md5_checksum` of the book, or a hash of the side-car path
    pub book_id: String,
    pub title: String,
    /// Authors as KOReader stores them (newline separated when several)
    pub authors: String,
    pub language: String,
}

impl BookMeta {
    /// Authors joined with ", " for display
    pub fn authors_display(&self) -> String {
        self.authors
            .lines()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One `highlight[index]` slot of the legacy mapping form.
///
/// Several entries under one index are successive versions of the same
/// highlight.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSlot {
    pub index: i64,
    pub entries: Vec<Value>,
}

/// The highlight records of a document, in whichever form it stores them.
///
/// Entries are kept untyped so a malformed one can be skipped on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEntries {
    /// `annotations = { [1] = {...}, ... }`
    Annotations(Vec<Value>),
    /// `highlight = { [page] = { [1] = {...} } }`, ordered by index
    Highlight(Vec<HighlightSlot>),
    /// `bookmarks = { [1] = {...}, ... }`
    Bookmarks(Vec<Value>),
}

impl AnnotationEntries {
    pub fn form(&self) -> &'static str {
        match self {
            AnnotationEntries::Annotations(_) => "annotations",
            AnnotationEntries::Highlight(_) => "highlight",
            AnnotationEntries::Bookmarks(_) => "bookmarks",
        }
    }

    /// Number of raw entries, counting every version in a highlight slot
    pub fn entry_count(&self) -> usize {
        match self {
            AnnotationEntries::Annotations(entries) | AnnotationEntries::Bookmarks(entries) => entries.len(),
            AnnotationEntries::Highlight(slots) => slots.iter().map(|s| s.entries.len()).sum(),
        }
    }
}

/// A parsed side-car document for one book
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDocument {
    pub source: PathBuf,
    pub meta: BookMeta,
    pub entries: AnnotationEntries,
}

/// A single highlighted passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub book_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Opaque location token where the highlight starts
    pub position_start: String,
    /// Opaque location token where the highlight ends
    pub position_end: String,
    /// Normalized passage text, never empty
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    /// Timestamp as written by the reader, for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawer_style: Option<String>,
}

impl Highlight {
    pub fn position(&self) -> (&str, &str) {
        (&self.position_start, &self.position_end)
    }
}

/// Why an entry was skipped or needed a judgement call during extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// The entry does not have the expected shape
    Malformed(String),
    /// A bookmark or note without highlighted text
    NotHighlighted,
    /// Nothing left after normalization
    EmptyText,
    /// Versions of one highlight are not in timestamp order; the latest won
    OutOfOrderAmendment { index: i64 },
}

/// A non-fatal problem with a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    /// 1-based position of the entry in the document
    pub ordinal: usize,
    pub kind: WarningKind,
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            WarningKind::Malformed(reason) => write!(f, "entry {} is malformed: {}", self.ordinal, reason),
            WarningKind::NotHighlighted => write!(f, "entry {} is not a highlight", self.ordinal),
            WarningKind::EmptyText => write!(f, "entry {} has no text", self.ordinal),
            WarningKind::OutOfOrderAmendment { index } => write!(
                f,
                "highlight {} has versions out of timestamp order, using the latest",
                index
            ),
        }
    }
}

/// Result of extracting highlights from one document
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub highlights: Vec<Highlight>,
    pub warnings: Vec<ExtractionWarning>,
    /// False when positions could not be ordered and source order was kept
    pub ordered_by_position: bool,
}
