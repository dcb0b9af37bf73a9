//! Data models for the flashcard decks

use serde::{Deserialize, Serialize};

use crate::cloze::{render, ClozeSpan};
use crate::koreader::BookMeta;

/// Default deck name template; `::` nests the book deck under a parent deck
pub const DEFAULT_DECK_NAME_TEMPLATE: &str = "Books Highlights 📚::{title}-{authors}";

/// One cloze card made from one highlight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClozeCard {
    pub book_title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    pub sentence_text: String,
    pub cloze_span: ClozeSpan,
}

impl ClozeCard {
    /// The hidden word or phrase
    pub fn answer(&self) -> &str {
        self.cloze_span.slice(&self.sentence_text)
    }

    /// Front field: the sentence with the span as `{{c1::...}}`
    pub fn cloze_text(&self) -> String {
        render(&self.sentence_text, self.cloze_span)
    }

    /// Back field: book, chapter and page context plus the highlight date
    pub fn back_extra(&self) -> String {
        let mut heading = html_escape::encode_text(&self.book_title).into_owned();
        if !self.author.is_empty() {
            heading.push_str(" - ");
            heading.push_str(&html_escape::encode_text(&self.author));
        }

        let chapter = self.chapter.as_deref().unwrap_or("-");
        let page = self
            .page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut back = format!(
            "<b>{}</b><br>Chapter: {} - Page: {}",
            heading,
            html_escape::encode_text(chapter),
            page
        );
        if let Some(datetime) = &self.datetime {
            back.push_str(&format!(
                "<br><span style=\"color: lightgrey; font-size: small; font-style: italic; float: right;\">{}</span>",
                html_escape::encode_text(datetime)
            ));
        }
        back
    }
}

/// A named, ordered collection of cards exported as one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    /// Stable Anki deck id derived from the name
    pub id: i64,
    pub name: String,
    pub cards: Vec<ClozeCard>,
    /// Book the deck was built from; the first book for a combined deck
    pub meta: BookMeta,
}

impl Deck {
    pub fn new(name: String, meta: BookMeta) -> Self {
        Self {
            id: deck_id(&name),
            name,
            cards: Vec::new(),
            meta,
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Append a card unless one with the same sentence and span exists.
    ///
    /// Returns whether the card was added.
    pub fn push_unique(&mut self, card: ClozeCard) -> bool {
        let duplicate = self
            .cards
            .iter()
            .any(|c| c.sentence_text == card.sentence_text && c.cloze_span == card.cloze_span);
        if duplicate {
            return false;
        }
        self.cards.push(card);
        true
    }
}

/// Deck id: md5 of the name read as a big-endian integer, modulo 10^10.
///
/// The same name always maps to the same id, so re-importing a book
/// updates its existing Anki deck.
pub fn deck_id(name: &str) -> i64 {
    let digest = md5::compute(name.as_bytes());
    (u128::from_be_bytes(digest.0) % 10_000_000_000) as i64
}

/// Expand `{title}`, `{authors}` and `{language}` in a deck name template
pub fn deck_name(template: &str, meta: &BookMeta) -> String {
    let name = template
        .replace("{title}", meta.title.trim())
        .replace("{authors}", &meta.authors_display())
        .replace("{language}", &meta.language);
    let name = name.trim();
    // "Parent::Title-" when the book has no author
    let name = name.strip_suffix('-').unwrap_or(name).trim_end();
    if name.is_empty() {
        meta.title.clone()
    } else {
        name.to_string()
    }
}
