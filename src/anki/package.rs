//! `.apkg` writer
//!
//! A package is a zip holding `collection.anki2` (an SQLite collection) and
//! a `media` index. Decks here carry no media, so the index is `{}`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

use regex::Regex;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::errors::Result;
use super::schema;
use crate::flashcards::{ClozeCard, Deck};
use crate::koreader::BookMeta;

const FIELD_SEPARATOR: &str = "\x1f";
const MAX_FILE_STEM_BYTES: usize = 120;

/// Next unused note id for this process
static NEXT_NOTE_ID: AtomicI64 = AtomicI64::new(0);
const BASE91_TABLE: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// Write `deck` as `<output_dir>/<title>_<authors>.apkg` and return the path.
pub fn export(deck: &Deck, output_dir: &Path) -> Result<PathBuf> {
    export_to(deck, &output_dir.join(package_file_name(&deck.meta)))
}

/// Write `deck` to `target`, replacing a package an earlier run left there.
///
/// The archive is assembled in a temporary file next to the target and
/// renamed into place, so a failed export leaves no partial package.
pub fn export_to(deck: &Deck, target: &Path) -> Result<PathBuf> {
    let output_dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let collection = tempfile::Builder::new()
        .prefix("collection")
        .suffix(".anki2")
        .tempfile()?;
    write_collection(deck, collection.path())?;
    let collection_bytes = fs::read(collection.path())?;

    let mut archive = tempfile::Builder::new()
        .prefix(".ko2anki")
        .suffix(".apkg.part")
        .tempfile_in(output_dir)?;
    {
        let mut zip = ZipWriter::new(archive.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("collection.anki2", options)?;
        zip.write_all(&collection_bytes)?;
        zip.start_file("media", options)?;
        zip.write_all(b"{}")?;
        zip.finish()?;
    }
    archive.as_file().sync_all()?;
    archive.persist(target)?;

    log::info!("Exported {} cards to {}", deck.len(), target.display());
    Ok(target.to_path_buf())
}

/// `<title>_<authors>.apkg`, made safe for common filesystems
pub fn package_file_name(meta: &BookMeta) -> String {
    let authors = meta.authors_display();
    let stem = if authors.is_empty() {
        meta.title.trim().to_string()
    } else {
        format!("{}_{}", meta.title.trim(), authors)
    };
    format!("{}.apkg", sanitize_file_stem(&stem))
}

/// Replace characters that are illegal in file names on Windows, macOS or
/// Linux, trim dots and cap the length.
pub fn sanitize_file_stem(stem: &str) -> String {
    let replaced: String = stem
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let mut out = replaced.trim_matches('.').to_string();
    if out.len() > MAX_FILE_STEM_BYTES {
        let mut cut = MAX_FILE_STEM_BYTES;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out = out.trim_end_matches('.').to_string();
    }

    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

fn write_collection(deck: &Deck, path: &Path) -> Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(schema::SCHEMA_SQL)?;

    let now = chrono::Utc::now();
    let now_secs = now.timestamp();
    let now_millis = now.timestamp_millis();

    conn.execute(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
         VALUES (1, ?1, ?2, ?2, ?3, 0, 0, 0, ?4, ?5, ?6, ?7, '{}')",
        params![
            now_secs,
            now_millis,
            schema::SCHEMA_VERSION,
            serde_json::to_string(&schema::collection_conf(deck.id))?,
            serde_json::to_string(&schema::models(deck.id, now_secs))?,
            serde_json::to_string(&schema::decks(deck.id, &deck.name, now_secs))?,
            serde_json::to_string(&schema::deck_config())?,
        ],
    )?;

    let first_id = reserve_note_ids(deck.cards.len(), now_millis);
    let tx = conn.unchecked_transaction()?;
    {
        let mut insert_note = tx.prepare(
            "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
             VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')",
        )?;
        let mut insert_card = tx.prepare(
            "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                                reps, lapses, left, odue, odid, flags, data)
             VALUES (?1, ?2, ?3, 0, ?4, -1, 0, 0, ?5, 0, 0, 0, 0, 0, 0, 0, 0, '')",
        )?;

        for (i, card) in deck.cards.iter().enumerate() {
            let fields = note_fields(card);
            let sort_field = strip_html(&fields[0]);
            let note_id = first_id + i as i64;
            insert_note.execute(params![
                note_id,
                note_guid(&fields),
                schema::CLOZE_MODEL_ID,
                now_secs,
                fields.join(FIELD_SEPARATOR),
                sort_field,
                field_checksum(&sort_field),
            ])?;
            insert_card.execute(params![note_id, note_id, deck.id, now_secs, i as i64 + 1])?;
        }
    }
    tx.commit()?;
    conn.close().map_err(|(_, e)| e)?;
    Ok(())
}

/// Claim `count` consecutive note ids, starting no earlier than `now_millis`.
///
/// Decks exported by one process never share ids, however close together
/// their exports run.
fn reserve_note_ids(count: usize, now_millis: i64) -> i64 {
    let count = count as i64;
    let mut current = NEXT_NOTE_ID.load(Ordering::Relaxed);
    loop {
        let first = current.max(now_millis);
        match NEXT_NOTE_ID.compare_exchange_weak(current, first + count, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return first,
            Err(actual) => current = actual,
        }
    }
}

/// `Text` and `Back Extra`
fn note_fields(card: &ClozeCard) -> [String; 2] {
    [card.cloze_text(), card.back_extra()]
}

/// Stable note id: base91 of the first 8 bytes of sha256 over the fields.
///
/// Identical cards keep their guid across exports, so Anki updates the
/// existing note on re-import.
fn note_guid(fields: &[String]) -> String {
    let digest = Sha256::digest(fields.join("__").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    base91(u64::from_be_bytes(prefix))
}

fn base91(mut n: u64) -> String {
    let base = BASE91_TABLE.len() as u64;
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE91_TABLE[(n % base) as usize]);
        n /= base;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// First 4 bytes of the sha1 of a field, as Anki computes `notes.csum`
fn field_checksum(text: &str) -> i64 {
    let digest = sha1_smol::Sha1::from(text).digest().bytes();
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

fn strip_html(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
    html_escape::decode_html_entities(&tag.replace_all(html, "")).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("Dune: Messiah"), "Dune__Messiah");
        assert_eq!(sanitize_file_stem("a/b\\c|d?e*f<g>h\"i"), "a_b_c_d_e_f_g_h_i");
        assert_eq!(sanitize_file_stem("..hidden.."), "hidden");
        assert_eq!(sanitize_file_stem("tab\there"), "tab_here");
        assert_eq!(sanitize_file_stem("..."), "untitled");
        assert_eq!(sanitize_file_stem(""), "untitled");
    }

    #[test]
    fn test_sanitize_caps_length_on_char_boundary() {
        let long = "é".repeat(100);
        let out = sanitize_file_stem(&long);
        assert!(out.len() <= MAX_FILE_STEM_BYTES);
        assert_eq!(out.chars().count(), 60);
    }

    #[test]
    fn test_note_id_ranges_do_not_overlap() {
        let now = 1_700_000_000_000;
        let first = reserve_note_ids(100, now);
        let second = reserve_note_ids(10, now + 50);
        assert!(first >= now);
        assert!(second >= first + 100);
        assert!(reserve_note_ids(1, 0) >= second + 10);
    }

    #[test]
    fn test_package_file_name() {
        let mut meta = BookMeta {
            book_id: "x".to_string(),
            title: "War and Peace".to_string(),
            authors: "Leo Tolstoy".to_string(),
            language: "en".to_string(),
        };
        assert_eq!(package_file_name(&meta), "War_and_Peace_Leo_Tolstoy.apkg");
        meta.authors = String::new();
        assert_eq!(package_file_name(&meta), "War_and_Peace.apkg");
    }

    #[test]
    fn test_base91() {
        assert_eq!(base91(0), "");
        assert_eq!(base91(1), "b");
        assert_eq!(base91(91), "ba");
    }

    #[test]
    fn test_guid_is_stable() {
        let fields = ["{{c1::Fear}} is the mind-killer.".to_string(), "Dune".to_string()];
        assert_eq!(note_guid(&fields), note_guid(&fields));
        assert_ne!(note_guid(&fields), note_guid(&[fields[0].clone(), "Emma".to_string()]));
    }

    #[test]
    fn test_strip_html_and_checksum() {
        assert_eq!(strip_html("{{c1::Fish}} &amp; <b>chips</b>"), "{{c1::Fish}} & chips");
        // sha1("") = da39a3ee...
        assert_eq!(field_checksum(""), 0xda39a3ee);
    }
}
