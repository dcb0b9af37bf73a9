//! Loading of `metadata.*.lua` side-car files

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use mlua::{ChunkMode, HookTriggers, Lua, LuaOptions, StdLib, VmState};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::models::{AnnotationDocument, AnnotationEntries, BookMeta, HighlightSlot};

/// Side-car files are plain data, a few MB at most
const LUA_MEMORY_LIMIT: usize = 256 * 1024 * 1024;
const LUA_HOOK_INTERVAL: u32 = 100_000;
/// Hook calls before evaluation is aborted, i.e. 10^8 VM instructions
const LUA_INSTRUCTION_BUDGET: u32 = 1_000;
const MAX_TABLE_DEPTH: usize = 128;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unexpected document shape: {0}")]
    Schema(String),

    #[error("Document has no `annotations`, `highlight` or `bookmarks` table")]
    MissingHighlights,
}

impl From<mlua::Error> for ParseError {
    fn from(e: mlua::Error) -> Self {
        ParseError::Syntax(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Deserialize, Default)]
struct RawDocument {
    #[serde(default)]
    annotations: Option<Value>,
    #[serde(default)]
    highlight: Option<Value>,
    #[serde(default)]
    bookmarks: Option<Value>,
    #[serde(default)]
    doc_props: Option<Value>,
    #[serde(default)]
    stats: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    partial_md5_checksum: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawProps {
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    authors: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    language: Option<String>,
}

/// Accept strings and numbers, treat anything else as missing
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Load and validate an annotation document
pub fn load(path: &Path) -> Result<AnnotationDocument> {
    let content = fs::read_to_string(path)?;
    parse_document(&content, path)
}

/// Parse side-car content; `path` is used for fallbacks and the book id
pub fn parse_document(content: &str, path: &Path) -> Result<AnnotationDocument> {
    let root = evaluate(content, path)?;
    if !root.is_object() {
        return Err(ParseError::Schema("top level is not a keyed table".to_string()));
    }

    let raw: RawDocument =
        serde_json::from_value(root).map_err(|e| ParseError::Schema(e.to_string()))?;

    let entries = if let Some(value) = raw.annotations {
        AnnotationEntries::Annotations(entry_list(value, "annotations")?)
    } else if let Some(value) = raw.highlight {
        let slots = lua_list(value)
            .ok_or_else(|| ParseError::Schema("`highlight` is not a table".to_string()))?
            .into_iter()
            .map(|(index, slot)| {
                let entries = if is_bare_entry(&slot) {
                    vec![slot]
                } else {
                    lua_list(slot)
                        .map(|list| list.into_iter().map(|(_, entry)| entry).collect())
                        .unwrap_or_else(|| vec![Value::Null])
                };
                HighlightSlot { index, entries }
            })
            .collect();
        AnnotationEntries::Highlight(slots)
    } else if let Some(value) = raw.bookmarks {
        AnnotationEntries::Bookmarks(entry_list(value, "bookmarks")?)
    } else {
        return Err(ParseError::MissingHighlights);
    };

    let meta = book_meta(
        props(raw.doc_props),
        props(raw.stats),
        raw.partial_md5_checksum,
        path,
    );

    Ok(AnnotationDocument {
        source: path.to_path_buf(),
        meta,
        entries,
    })
}

/// Run the side-car chunk in a sandbox and return its value as JSON.
///
/// The state has no standard library, accepts only source text and is
/// capped in memory and instructions, so a side-car can build tables and
/// nothing else.
fn evaluate(content: &str, path: &Path) -> Result<Value> {
    let lua = Lua::new_with(StdLib::NONE, LuaOptions::default())?;
    lua.set_memory_limit(LUA_MEMORY_LIMIT)?;

    let ticks = AtomicU32::new(0);
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(LUA_HOOK_INTERVAL),
        move |_, _| {
            if ticks.fetch_add(1, Ordering::Relaxed) >= LUA_INSTRUCTION_BUDGET {
                return Err(mlua::Error::RuntimeError(
                    "instruction budget exceeded".to_string(),
                ));
            }
            Ok(VmState::Continue)
        },
    );

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "metadata.lua".to_string());
    let value: mlua::Value = lua
        .load(content)
        .set_name(name)
        .set_mode(ChunkMode::Text)
        .eval()?;
    lua_to_json(value, 0)
}

/// Tables keyed exactly `1..=n` become arrays, every other table an object
/// with stringified keys. `nil` fields are absent in Lua already;
/// functions and other non-data values turn into `null`.
fn lua_to_json(value: mlua::Value, depth: usize) -> Result<Value> {
    Ok(match value {
        mlua::Value::Nil => Value::Null,
        mlua::Value::Boolean(b) => Value::Bool(b),
        mlua::Value::Integer(i) => Value::Number(i.into()),
        mlua::Value::Number(n) => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        mlua::Value::String(s) => Value::String(String::from(s.to_string_lossy())),
        mlua::Value::Table(table) => {
            if depth >= MAX_TABLE_DEPTH {
                return Err(ParseError::Schema(format!(
                    "tables nested deeper than {} levels",
                    MAX_TABLE_DEPTH
                )));
            }
            let mut fields = Vec::new();
            for pair in table.pairs::<mlua::Value, mlua::Value>() {
                let (key, value) = pair?;
                fields.push((key, lua_to_json(value, depth + 1)?));
            }
            table_to_json(fields)
        }
        _ => Value::Null,
    })
}

fn table_to_json(fields: Vec<(mlua::Value, Value)>) -> Value {
    let mut indexed: Vec<(i64, Value)> = Vec::new();
    let mut keyed: Vec<(String, Value)> = Vec::new();
    for (key, value) in fields {
        match key {
            mlua::Value::Integer(i) => indexed.push((i, value)),
            mlua::Value::String(s) => keyed.push((String::from(s.to_string_lossy()), value)),
            mlua::Value::Number(n) => keyed.push((n.to_string(), value)),
            mlua::Value::Boolean(b) => keyed.push((b.to_string(), value)),
            other => log::debug!("Ignoring table key of type {}", other.type_name()),
        }
    }
    indexed.sort_by_key(|(i, _)| *i);

    let is_sequence = keyed.is_empty()
        && !indexed.is_empty()
        && indexed.iter().enumerate().all(|(n, (i, _))| *i == n as i64 + 1);
    if is_sequence {
        return Value::Array(indexed.into_iter().map(|(_, v)| v).collect());
    }

    let mut map = Map::new();
    for (i, value) in indexed {
        map.insert(i.to_string(), value);
    }
    for (key, value) in keyed {
        map.insert(key, value);
    }
    Value::Object(map)
}

fn entry_list(value: Value, key: &str) -> Result<Vec<Value>> {
    lua_list(value)
        .map(|list| list.into_iter().map(|(_, entry)| entry).collect())
        .ok_or_else(|| ParseError::Schema(format!("`{}` is not a table", key)))
}

/// A highlight stored directly under its index instead of in a version list
fn is_bare_entry(slot: &Value) -> bool {
    slot.as_object()
        .is_some_and(|map| map.keys().any(|k| k.parse::<i64>().is_err()))
}

fn props(value: Option<Value>) -> RawProps {
    value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Read a Lua list that may have been converted to a JSON array or to an
/// object with integer keys. Items come back ordered by index.
pub(crate) fn lua_list(value: Value) -> Option<Vec<(i64, Value)>> {
    match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i as i64 + 1, v))
                .collect(),
        ),
        Value::Object(map) => {
            let mut items: Vec<(i64, Value)> = map
                .into_iter()
                .filter_map(|(k, v)| match k.parse::<i64>() {
                    Ok(index) => Some((index, v)),
                    Err(_) => {
                        log::debug!("Ignoring non-numeric list key {:?}", k);
                        None
                    }
                })
                .collect();
            items.sort_by_key(|(index, _)| *index);
            Some(items)
        }
        _ => None,
    }
}

fn book_meta(doc_props: RawProps, stats: RawProps, checksum: Option<String>, path: &Path) -> BookMeta {
    let title = doc_props
        .title
        .or(stats.title)
        .or_else(|| title_from_path(path))
        .unwrap_or_else(|| "Untitled".to_string());

    let authors = doc_props.authors.or(stats.authors).unwrap_or_default();

    let language = doc_props
        .language
        .or(stats.language)
        .unwrap_or_else(|| "en".to_string());

    let book_id = checksum
        .unwrap_or_else(|| format!("{:x}", md5::compute(path.to_string_lossy().as_bytes())));

    BookMeta {
        book_id,
        title: title.trim().to_string(),
        authors: authors.trim().to_string(),
        language: language.trim().to_string(),
    }
}

/// KOReader keeps side-cars in `<book name>.sdr/`
fn title_from_path(path: &Path) -> Option<String> {
    let dir = path.parent()?.file_name()?.to_string_lossy().to_string();
    let title = dir.strip_suffix(".sdr").unwrap_or(&dir).trim().to_string();
    (!title.is_empty()).then_some(title)
}
