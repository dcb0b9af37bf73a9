//! Cloze span selection and rendering

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{SelectionError, SelectionResult};
use super::scorer::{HeuristicScorer, ImportanceScorer, Word};
use super::stopwords::stopwords_for;

/// Words shorter than this are never blanked unless configured otherwise
pub const DEFAULT_MIN_WORD_LEN: usize = 4;

/// Byte range of the blanked part of a sentence.
///
/// Always on char boundaries with `start < end <= text.len()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClozeSpan {
    pub start: usize,
    pub end: usize,
}

impl ClozeSpan {
    /// The blanked substring of `text`
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    /// Whether the span is non-empty and lies on char boundaries of `text`
    pub fn fits(&self, text: &str) -> bool {
        self.start < self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

/// Chooses the word to blank in a highlight
#[derive(Clone)]
pub struct ClozeSelector {
    scorer: Arc<dyn ImportanceScorer>,
    stopwords: &'static HashSet<&'static str>,
    min_word_len: usize,
}

impl std::fmt::Debug for ClozeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClozeSelector")
            .field("scorer", &self.scorer.name())
            .field("min_word_len", &self.min_word_len)
            .finish()
    }
}

impl ClozeSelector {
    pub fn new(scorer: Arc<dyn ImportanceScorer>, language: &str, min_word_len: usize) -> Self {
        Self {
            scorer,
            stopwords: stopwords_for(language),
            min_word_len: min_word_len.max(1),
        }
    }

    /// Selector backed by the model-free length heuristic
    pub fn heuristic(language: &str, min_word_len: usize) -> Self {
        Self::new(Arc::new(HeuristicScorer), language, min_word_len)
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Same scorer and word rules, stopwords of another language
    pub fn for_language(&self, language: &str) -> Self {
        Self {
            scorer: Arc::clone(&self.scorer),
            stopwords: stopwords_for(language),
            min_word_len: self.min_word_len,
        }
    }

    /// Pick the span to blank in `text`.
    ///
    /// Falls back to the whole trimmed text when no word qualifies.
    pub fn select(&self, text: &str) -> SelectionResult<ClozeSpan> {
        let whole = trimmed_span(text).ok_or(SelectionError::EmptyText)?;

        let all_words = words(text);
        if all_words.len() <= 1 {
            return Ok(whole);
        }

        let candidates: Vec<Word<'_>> = all_words.into_iter().filter(|w| self.is_eligible(w)).collect();
        match candidates.len() {
            0 => return Ok(whole),
            1 => return Ok(span_of(&candidates[0])),
            _ => {}
        }

        let scores = self.scorer.score(text, &candidates)?;
        if scores.len() != candidates.len() {
            return Err(SelectionError::ScoreCount {
                expected: candidates.len(),
                actual: scores.len(),
            });
        }

        let best = best_index(&scores).ok_or_else(|| {
            SelectionError::Inference(format!("{} returned no usable score", self.scorer.name()))
        })?;
        Ok(span_of(&candidates[best]))
    }

    fn is_eligible(&self, word: &Word<'_>) -> bool {
        word.text.chars().all(char::is_alphabetic)
            && word.text.chars().count() >= self.min_word_len
            && !self.stopwords.contains(word.text.to_lowercase().as_str())
    }
}

/// Split `text` into words: whitespace-separated runs without their
/// leading and trailing punctuation. Offsets index into `text`.
pub fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = run_start.take() {
                push_trimmed(text, start, i, &mut out);
            }
        } else if run_start.is_none() {
            run_start = Some(i);
        }
    }
    if let Some(start) = run_start {
        push_trimmed(text, start, text.len(), &mut out);
    }
    out
}

fn push_trimmed<'a>(text: &'a str, start: usize, end: usize, out: &mut Vec<Word<'a>>) {
    let run = &text[start..end];
    let Some(first) = run.find(char::is_alphanumeric) else {
        return;
    };
    let Some((last, last_char)) = run.char_indices().rev().find(|(_, c)| c.is_alphanumeric()) else {
        return;
    };
    let word_start = start + first;
    let word_end = start + last + last_char.len_utf8();
    out.push(Word {
        text: &text[word_start..word_end],
        start: word_start,
        end: word_end,
    });
}

fn trimmed_span(text: &str) -> Option<ClozeSpan> {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len();
    (start < end).then_some(ClozeSpan { start, end })
}

fn span_of(word: &Word<'_>) -> ClozeSpan {
    ClozeSpan {
        start: word.start,
        end: word.end,
    }
}

/// Index of the highest score. The first one wins a tie and NaN never wins.
fn best_index(scores: &[f32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some(b) if *score <= scores[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Render `text` as an Anki cloze field with `span` as `c1`.
///
/// Text is HTML-escaped; `::` and `}}` inside the blank are written as
/// entities so Anki does not read them as cloze syntax.
pub fn render(text: &str, span: ClozeSpan) -> String {
    let before = html_escape::encode_text(&text[..span.start]);
    let answer = html_escape::encode_text(span.slice(text))
        .replace("::", ":&#58;")
        .replace("}}", "}&#125;");
    let after = html_escape::encode_text(&text[span.end..]);
    format!("{}{{{{c1::{}}}}}{}", before, answer, after)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScorer(Vec<f32>);

    impl ImportanceScorer for FixedScorer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn score(&self, _text: &str, _candidates: &[Word<'_>]) -> SelectionResult<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn fixed(scores: Vec<f32>) -> ClozeSelector {
        ClozeSelector::new(Arc::new(FixedScorer(scores)), "en", DEFAULT_MIN_WORD_LEN)
    }

    #[test]
    fn test_words_trim_punctuation() {
        let ws = words("  «Hello», world... (again)");
        let texts: Vec<&str> = ws.iter().map(|w| w.text).collect();
        assert_eq!(texts, vec!["Hello", "world", "again"]);
        for w in &ws {
            assert_eq!(&"  «Hello», world... (again)"[w.start..w.end], w.text);
        }
    }

    #[test]
    fn test_words_skip_pure_punctuation() {
        let texts: Vec<&str> = words("one - two ...").iter().map(|w| w.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_heuristic_picks_longest_non_stopword() {
        let selector = ClozeSelector::heuristic("en", DEFAULT_MIN_WORD_LEN);
        let text = "The mitochondria is the powerhouse of the cell.";
        let span = selector.select(text).unwrap();
        assert_eq!(span.slice(text), "mitochondria");
    }

    #[test]
    fn test_heuristic_tie_breaks_by_first_occurrence() {
        let selector = ClozeSelector::heuristic("en", DEFAULT_MIN_WORD_LEN);
        let text = "apple grape lemon";
        assert_eq!(selector.select(text).unwrap().slice(text), "apple");
    }

    #[test]
    fn test_heuristic_is_deterministic() {
        let selector = ClozeSelector::heuristic("en", DEFAULT_MIN_WORD_LEN);
        let text = "Every moment wasted looking back keeps us from moving forward.";
        assert_eq!(selector.select(text).unwrap(), selector.select(text).unwrap());
    }

    #[test]
    fn test_stopwords_and_short_words_are_skipped() {
        let selector = ClozeSelector::heuristic("en", DEFAULT_MIN_WORD_LEN);
        let text = "Nevertheless, the cat sat.";
        // "Nevertheless" is the only eligible word
        assert_eq!(selector.select(text).unwrap().slice(text), "Nevertheless");

        let text = "it is what it is";
        assert_eq!(selector.select(text).unwrap().slice(text), "it is what it is");
    }

    #[test]
    fn test_non_alphabetic_words_are_skipped() {
        let selector = ClozeSelector::heuristic("en", DEFAULT_MIN_WORD_LEN);
        let text = "Build 2024 shipped in well-known places";
        assert_eq!(selector.select(text).unwrap().slice(text), "shipped");
    }

    #[test]
    fn test_language_specific_stopwords() {
        let selector = ClozeSelector::heuristic("de", DEFAULT_MIN_WORD_LEN);
        let text = "zwischen Haus";
        assert_eq!(selector.select(text).unwrap().slice(text), "Haus");
    }

    #[test]
    fn test_single_word_text_is_fully_selected() {
        let selector = ClozeSelector::heuristic("en", DEFAULT_MIN_WORD_LEN);
        let text = "  Serendipity!  ";
        let span = selector.select(text).unwrap();
        assert_eq!(span.slice(text), "Serendipity!");
    }

    #[test]
    fn test_empty_text_is_an_error() {
        let selector = ClozeSelector::heuristic("en", DEFAULT_MIN_WORD_LEN);
        assert_eq!(selector.select("   "), Err(SelectionError::EmptyText));
        assert_eq!(selector.select(""), Err(SelectionError::EmptyText));
    }

    #[test]
    fn test_scorer_ties_and_nan() {
        let text = "alpha bravo charlie delta";
        let span = fixed(vec![1.0, 3.0, 3.0, 2.0]).select(text).unwrap();
        assert_eq!(span.slice(text), "bravo");

        let span = fixed(vec![f32::NAN, 0.5, f32::NAN, 0.1]).select(text).unwrap();
        assert_eq!(span.slice(text), "bravo");

        assert!(matches!(
            fixed(vec![f32::NAN; 4]).select(text),
            Err(SelectionError::Inference(_))
        ));
    }

    #[test]
    fn test_score_count_mismatch() {
        let text = "alpha bravo charlie";
        assert_eq!(
            fixed(vec![1.0]).select(text),
            Err(SelectionError::ScoreCount { expected: 3, actual: 1 })
        );
    }

    #[test]
    fn test_span_is_valid_for_multibyte_text() {
        let selector = ClozeSelector::heuristic("fr", DEFAULT_MIN_WORD_LEN);
        let text = "Une journée très ensoleillée à Montréal";
        let span = selector.select(text).unwrap();
        assert!(span.fits(text));
        assert_eq!(span.slice(text), "ensoleillée");
    }

    #[test]
    fn test_render() {
        let text = "Fish & chips are tasty";
        let span = ClozeSpan { start: 7, end: 12 };
        assert_eq!(render(text, span), "Fish &amp; {{c1::chips}} are tasty");
    }

    #[test]
    fn test_render_escapes_cloze_syntax_in_answer() {
        let text = "a::b}}";
        let span = ClozeSpan { start: 0, end: text.len() };
        assert_eq!(render(text, span), "{{c1::a:&#58;b}&#125;}}");
    }
}
