//! Cloze flashcard decks built from highlights
//!
//! This module provides:
//! - Card and deck models with Anki field rendering
//! - Deck naming from a template and stable deck ids
//! - The card builder with position and card deduplication

mod builder;
pub mod models;

pub use builder::build;
pub use models::*;
