//! Highlight-to-deck pipeline
//!
//! Runs every input document through load, extract, build and export.
//! Supports:
//! - Failure isolation: a broken book is reported and the run goes on
//! - One deck per book, or one combined deck for every book
//! - Model-backed or heuristic cloze selection with per-card fallback

mod models;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use models::{DocumentReport, DocumentState, PipelineError, RunReport, Stage};

use crate::anki;
use crate::cloze::{ClozeSelector, HeuristicScorer, ImportanceScorer};
use crate::config::Config;
use crate::flashcards::{self, Deck};
use crate::koreader::{self, BookMeta};

/// Convert `inputs` into decks under `output_dir` with default settings
/// apart from the deck name template and scorer choice.
pub fn run(
    inputs: &[PathBuf],
    output_dir: &Path,
    deck_name_template: &str,
    use_ai: bool,
) -> Result<RunReport, PipelineError> {
    let config = Config {
        deck_name_template: deck_name_template.to_string(),
        use_ai,
        ..Config::default()
    };
    Pipeline::new(config).run(inputs, output_dir)
}

/// A configured conversion run
pub struct Pipeline {
    config: Config,
    selector: ClozeSelector,
    fallback: ClozeSelector,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let scorer = primary_scorer(&config);
        Self::with_scorer(config, scorer)
    }

    /// Use `scorer` for cloze selection, with the heuristic as fallback
    pub fn with_scorer(config: Config, scorer: Arc<dyn ImportanceScorer>) -> Self {
        let language = config.language.clone().unwrap_or_else(|| "en".to_string());
        let selector = ClozeSelector::new(scorer, &language, config.min_word_len);
        let fallback = ClozeSelector::heuristic(&language, config.min_word_len);
        Self {
            config,
            selector,
            fallback,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process every input. Only an unusable `output_dir` fails the run;
    /// per-document problems end up in the report.
    pub fn run(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<RunReport, PipelineError> {
        ensure_output_dir(output_dir)?;
        log::info!(
            "Converting {} documents with the {} scorer",
            inputs.len(),
            self.selector.scorer_name()
        );

        let mut report = RunReport::default();
        let mut combined: Option<Deck> = None;
        let mut claimed = HashSet::new();

        for source in inputs {
            let mut doc = DocumentReport::new(source);
            if let Some(deck) = self.build_document(source, &mut doc) {
                match &self.config.combined_deck {
                    Some(name) => {
                        let target = combined.get_or_insert_with(|| {
                            Deck::new(name.clone(), self.combined_meta(name, &deck.meta))
                        });
                        doc.cards = deck
                            .cards
                            .into_iter()
                            .filter(|card| target.push_unique(card.clone()))
                            .count();
                    }
                    None => self.export_document(&deck, output_dir, &mut claimed, &mut doc),
                }
            }
            report.documents.push(doc);
        }

        if let Some(deck) = combined {
            self.export_combined(&deck, output_dir, &mut report);
        }

        log::info!(
            "Exported {} of {} documents ({} cards), {} failed",
            report.exported(),
            report.documents.len(),
            report.cards(),
            report.failed()
        );
        Ok(report)
    }

    /// Load, extract and build one document. `None` once it has failed.
    fn build_document(&self, source: &Path, doc: &mut DocumentReport) -> Option<Deck> {
        let document = match koreader::load(source) {
            Ok(document) => document,
            Err(e) => {
                doc.fail(Stage::Load, e.to_string());
                return None;
            }
        };
        doc.title = Some(document.meta.title.clone());
        doc.advance(DocumentState::Loaded);

        let extraction = koreader::extract(&document);
        for warning in &extraction.warnings {
            log::warn!("{}: {}", source.display(), warning);
        }
        if !extraction.ordered_by_position {
            log::warn!("{}: positions are not comparable, keeping file order", source.display());
        }
        doc.warnings = extraction.warnings.len();
        doc.advance(DocumentState::Extracted);

        let language = self
            .config
            .language
            .as_deref()
            .unwrap_or(&document.meta.language);
        let deck = flashcards::build(
            &extraction.highlights,
            &document.meta,
            &self.config.deck_name_template,
            &self.selector.for_language(language),
            &self.fallback.for_language(language),
        );
        if deck.is_empty() {
            doc.fail(Stage::Build, "no highlights");
            return None;
        }
        doc.cards = deck.len();
        doc.advance(DocumentState::Built);
        Some(deck)
    }

    fn export_document(
        &self,
        deck: &Deck,
        output_dir: &Path,
        claimed: &mut HashSet<String>,
        doc: &mut DocumentReport,
    ) {
        let target = claim_package_path(output_dir, &deck.meta, claimed);
        match anki::export_to(deck, &target) {
            Ok(path) => doc.advance(DocumentState::Exported { path }),
            Err(e) => doc.fail(Stage::Export, e.to_string()),
        }
    }

    fn export_combined(&self, deck: &Deck, output_dir: &Path, report: &mut RunReport) {
        let result = anki::export(deck, output_dir);
        for doc in report
            .documents
            .iter_mut()
            .filter(|d| d.state == DocumentState::Built)
        {
            match &result {
                Ok(path) => doc.advance(DocumentState::Exported { path: path.clone() }),
                Err(e) => doc.fail(Stage::Export, e.to_string()),
            }
        }
    }

    fn combined_meta(&self, name: &str, first: &BookMeta) -> BookMeta {
        BookMeta {
            book_id: format!("{:x}", md5::compute(name.as_bytes())),
            title: name.to_string(),
            authors: String::new(),
            language: self.config.language.clone().unwrap_or_else(|| first.language.clone()),
        }
    }
}

/// Package path for `meta` that no earlier document of this run took.
///
/// Books sharing a title and authors (an EPUB and a PDF of one book, say)
/// get `_2`, `_3`, ... appended. Names compare case-insensitively.
fn claim_package_path(output_dir: &Path, meta: &BookMeta, claimed: &mut HashSet<String>) -> PathBuf {
    let file_name = anki::package_file_name(meta);
    let stem = file_name.strip_suffix(".apkg").unwrap_or(&file_name);

    let mut candidate = file_name.clone();
    let mut n = 2;
    while !claimed.insert(candidate.to_lowercase()) {
        candidate = format!("{}_{}.apkg", stem, n);
        n += 1;
    }
    if candidate != file_name {
        log::warn!(
            "{} is already taken by another book in this run, writing {} instead",
            file_name,
            candidate
        );
    }
    output_dir.join(candidate)
}

fn primary_scorer(config: &Config) -> Arc<dyn ImportanceScorer> {
    if config.use_ai {
        if let Some(scorer) = model_scorer(config) {
            return scorer;
        }
    }
    Arc::new(HeuristicScorer)
}

#[cfg(feature = "bert")]
fn model_scorer(config: &Config) -> Option<Arc<dyn ImportanceScorer>> {
    let scorer = crate::cloze::BertScorer::new(config.bert_model.clone());
    match scorer.warm_up() {
        Ok(()) => Some(Arc::new(scorer)),
        Err(e) => {
            log::warn!("{}; using the heuristic scorer", e);
            None
        }
    }
}

#[cfg(not(feature = "bert"))]
fn model_scorer(config: &Config) -> Option<Arc<dyn ImportanceScorer>> {
    log::warn!(
        "Built without the `bert` feature, {} is unavailable; using the heuristic scorer",
        config.bert_model
    );
    None
}

/// Create `path` if needed and check that files can be written into it
fn ensure_output_dir(path: &Path) -> Result<(), PipelineError> {
    let fail = |reason: String| PipelineError::OutputDir {
        path: path.to_path_buf(),
        reason,
    };
    if path.exists() && !path.is_dir() {
        return Err(fail("not a directory".to_string()));
    }
    fs::create_dir_all(path).map_err(|e| fail(e.to_string()))?;
    tempfile::tempfile_in(path).map_err(|e| fail(format!("not writable: {}", e)))?;
    Ok(())
}
