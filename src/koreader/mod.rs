//! KOReader side-car import
//!
//! Reads the `metadata.<ext>.lua` files KOReader keeps next to each book
//! (inside `<book>.sdr/`) and turns them into highlight records.
//! Supports:
//! - The current `annotations` list
//! - The legacy `highlight` mapping with versioned entries
//! - The legacy `bookmarks` list
//! - EPUB XPointer and PDF page positions

mod extract;
mod loader;
mod models;
pub mod position;

pub use extract::{extract, normalize_text};
pub use loader::{load, parse_document, ParseError};
pub use models::*;
