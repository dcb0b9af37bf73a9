//! Run configuration
//!
//! Values come from defaults, then `config.toml`, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cloze::DEFAULT_MIN_WORD_LEN;
use crate::flashcards::DEFAULT_DECK_NAME_TEMPLATE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for one conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Deck name with `{title}`, `{authors}` and `{language}` placeholders
    #[serde(default = "default_deck_name_template")]
    pub deck_name_template: String,
    /// Score words with the masked language model instead of word length
    #[serde(default = "default_use_ai")]
    pub use_ai: bool,
    #[serde(default = "default_min_word_len")]
    pub min_word_len: usize,
    /// Put every book into this one deck instead of one deck per book
    #[serde(default)]
    pub combined_deck: Option<String>,
    #[serde(default = "default_bert_model")]
    pub bert_model: String,
    /// Stopword language for every book, instead of each book's own
    #[serde(default)]
    pub language: Option<String>,
}

fn default_deck_name_template() -> String {
    DEFAULT_DECK_NAME_TEMPLATE.to_string()
}

fn default_use_ai() -> bool {
    true
}

fn default_min_word_len() -> usize {
    DEFAULT_MIN_WORD_LEN
}

fn default_bert_model() -> String {
    "bert-base-uncased".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deck_name_template: default_deck_name_template(),
            use_ai: default_use_ai(),
            min_word_len: default_min_word_len(),
            combined_deck: None,
            bert_model: default_bert_model(),
            language: None,
        }
    }
}

/// Values given on the command line; `None` keeps the file's value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub deck_name_template: Option<String>,
    pub no_ai: bool,
    pub min_word_len: Option<usize>,
    pub combined_deck: Option<String>,
    pub language: Option<String>,
}

impl Config {
    /// `<config dir>/ko2anki/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ko2anki").join("config.toml"))
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content, path)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `explicit` if given, else the default file when it exists, else defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(template) = overrides.deck_name_template {
            self.deck_name_template = template;
        }
        if overrides.no_ai {
            self.use_ai = false;
        }
        if let Some(len) = overrides.min_word_len {
            self.min_word_len = len;
        }
        if overrides.combined_deck.is_some() {
            self.combined_deck = overrides.combined_deck;
        }
        if overrides.language.is_some() {
            self.language = overrides.language;
        }
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "combined_deck = \"Everything\"\n").unwrap();

        let config = Config::resolve(Some(&path)).unwrap();
        assert_eq!(config.combined_deck.as_deref(), Some("Everything"));
        assert!(config.use_ai);
    }

    #[test]
    fn test_resolve_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::resolve(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
