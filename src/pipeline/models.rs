//! Per-document states and the run report

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that stop the whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Output folder {path} is unusable: {reason}")]
    OutputDir { path: PathBuf, reason: String },
}

/// Step a document was in when it failed.
///
/// Extraction never fails a document; bad entries only produce warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Build,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Build => "build",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Progress of one input document.
///
/// `Pending → Loaded → Extracted → Built → Exported`, or `Failed` from any
/// step before `Exported`.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState {
    Pending,
    Loaded,
    Extracted,
    Built,
    Exported { path: PathBuf },
    Failed { stage: Stage, reason: String },
}

impl DocumentState {
    pub fn is_exported(&self) -> bool {
        matches!(self, DocumentState::Exported { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DocumentState::Failed { .. })
    }
}

/// Outcome for one input document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReport {
    pub source: PathBuf,
    /// Book title once the document loaded
    pub title: Option<String>,
    pub state: DocumentState,
    /// Skipped or questionable entries found during extraction
    pub warnings: usize,
    pub cards: usize,
}

impl DocumentReport {
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            title: None,
            state: DocumentState::Pending,
            warnings: 0,
            cards: 0,
        }
    }

    pub(crate) fn advance(&mut self, state: DocumentState) {
        log::debug!("{}: {:?} -> {:?}", self.source.display(), self.state, state);
        self.state = state;
    }

    pub(crate) fn fail(&mut self, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("{}: {} failed: {}", self.source.display(), stage, reason);
        self.state = DocumentState::Failed { stage, reason };
    }
}

/// Outcome of a whole run, one entry per input in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub documents: Vec<DocumentReport>,
}

impl RunReport {
    /// True when at least one document was exported
    pub fn succeeded(&self) -> bool {
        self.documents.iter().any(|d| d.state.is_exported())
    }

    pub fn exported(&self) -> usize {
        self.documents.iter().filter(|d| d.state.is_exported()).count()
    }

    pub fn failed(&self) -> usize {
        self.documents.iter().filter(|d| d.state.is_failed()).count()
    }

    pub fn cards(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.state.is_exported())
            .map(|d| d.cards)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_report_counts() {
        let mut ok = DocumentReport::new(Path::new("a.sdr/metadata.epub.lua"));
        ok.cards = 3;
        ok.advance(DocumentState::Exported { path: PathBuf::from("out/a.apkg") });
        let mut bad = DocumentReport::new(Path::new("b.sdr/metadata.epub.lua"));
        bad.fail(Stage::Load, "Syntax error");

        let report = RunReport { documents: vec![ok, bad] };
        assert!(report.succeeded());
        assert_eq!(report.exported(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cards(), 3);
    }

    #[test]
    fn test_no_export_is_not_success() {
        let mut bad = DocumentReport::new(Path::new("b.sdr/metadata.epub.lua"));
        bad.fail(Stage::Build, "no highlights");
        assert!(!RunReport { documents: vec![bad] }.succeeded());
        assert!(!RunReport::default().succeeded());
    }
}
