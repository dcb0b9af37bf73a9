//! Cloze deletion
//!
//! Picks one word of a highlight to hide and renders the Anki cloze field.
//! Supports:
//! - A deterministic length heuristic
//! - A BERT masked language model scorer (cargo feature `bert`)
//! - Stopword sets for English, French, German, Spanish and Italian

#[cfg(feature = "bert")]
mod bert;
mod errors;
mod scorer;
mod selector;
pub mod stopwords;

#[cfg(feature = "bert")]
pub use bert::BertScorer;
pub use errors::{SelectionError, SelectionResult};
pub use scorer::{HeuristicScorer, ImportanceScorer, Word};
pub use selector::{render, words, ClozeSelector, ClozeSpan, DEFAULT_MIN_WORD_LEN};
