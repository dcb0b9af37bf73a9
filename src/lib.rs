//! KOReader highlights to Anki cloze decks.
//!
//! `pipeline::run` is the entry point; the other modules are the steps it
//! chains together.

pub mod anki;
pub mod cloze;
pub mod config;
pub mod flashcards;
pub mod koreader;
pub mod pipeline;
