//! Anki package export
//!
//! Writes decks as `.apkg` files Anki imports directly.
//! Supports:
//! - Collection schema 11 with a cloze note type (`Text`, `Back Extra`)
//! - Stable deck ids and note guids, so re-imports update existing cards
//! - Atomic writes through a temporary file in the output folder

mod errors;
mod package;
pub mod schema;

pub use errors::{ExportError, Result};
pub use package::{export, export_to, package_file_name, sanitize_file_stem};
