//! Word importance scoring

use super::errors::SelectionResult;

/// A word of the highlight text, with byte offsets into that text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Scores candidate words of a sentence; the highest score gets blanked.
///
/// Implementations are shared read-only across every document of a run.
pub trait ImportanceScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// One score per candidate, in candidate order. Higher is more important.
    fn score(&self, text: &str, candidates: &[Word<'_>]) -> SelectionResult<Vec<f32>>;
}

/// Model-free scorer: longer words are more important.
///
/// Deterministic, so repeated runs produce identical decks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl ImportanceScorer for HeuristicScorer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn score(&self, _text: &str, candidates: &[Word<'_>]) -> SelectionResult<Vec<f32>> {
        Ok(candidates
            .iter()
            .map(|w| w.text.chars().count() as f32)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_scores_by_char_length() {
        let text = "café extraordinary";
        let words = [
            Word { text: "café", start: 0, end: 5 },
            Word { text: "extraordinary", start: 6, end: 19 },
        ];
        let scores = HeuristicScorer.score(text, &words).unwrap();
        assert_eq!(scores, vec![4.0, 13.0]);
    }
}
