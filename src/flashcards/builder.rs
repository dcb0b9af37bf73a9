//! Turns a book's highlights into a deck of cloze cards

use std::collections::HashMap;

use crate::cloze::ClozeSelector;
use crate::koreader::{BookMeta, Highlight};

use super::models::{deck_name, ClozeCard, Deck};

/// Build the deck for one book.
///
/// Cards follow the order of `highlights`. A highlight repeated at the same
/// position replaces the earlier one in place. When `selector` fails on a
/// highlight, `fallback` is tried; if both fail the highlight is dropped.
pub fn build(
    highlights: &[Highlight],
    meta: &BookMeta,
    template: &str,
    selector: &ClozeSelector,
    fallback: &ClozeSelector,
) -> Deck {
    let mut deck = Deck::new(deck_name(template, meta), meta.clone());
    let author = meta.authors_display();

    for highlight in dedupe_by_position(highlights) {
        let span = match selector.select(&highlight.text) {
            Ok(span) => span,
            Err(e) => {
                log::warn!(
                    "{}: {} selection failed at {}, using {}: {}",
                    meta.title,
                    selector.scorer_name(),
                    highlight.position_start,
                    fallback.scorer_name(),
                    e
                );
                match fallback.select(&highlight.text) {
                    Ok(span) => span,
                    Err(e) => {
                        log::warn!(
                            "{}: dropping highlight at {}: {}",
                            meta.title,
                            highlight.position_start,
                            e
                        );
                        continue;
                    }
                }
            }
        };

        let card = ClozeCard {
            book_title: meta.title.clone(),
            author: author.clone(),
            chapter: highlight.chapter.clone(),
            page: highlight.page,
            datetime: highlight.datetime.clone(),
            sentence_text: highlight.text.clone(),
            cloze_span: span,
        };
        if !deck.push_unique(card) {
            log::debug!(
                "{}: duplicate card at {} skipped",
                meta.title,
                highlight.position_start
            );
        }
    }

    log::debug!("{}: built {} cards from {} highlights", deck.name, deck.len(), highlights.len());
    deck
}

/// Keep one highlight per `(position_start, position_end)`.
///
/// A later highlight takes the place of the first one at that position.
fn dedupe_by_position(highlights: &[Highlight]) -> Vec<&Highlight> {
    let mut slots: HashMap<(&str, &str), usize> = HashMap::new();
    let mut out: Vec<&Highlight> = Vec::with_capacity(highlights.len());
    for highlight in highlights {
        match slots.get(&highlight.position()) {
            Some(&slot) => out[slot] = highlight,
            None => {
                slots.insert(highlight.position(), out.len());
                out.push(highlight);
            }
        }
    }
    out
}
