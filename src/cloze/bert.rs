//! Masked language model scorer.
//!
//! Each candidate word is replaced by the mask token and the model is asked
//! to predict it back. Words the model finds hard to guess carry the most
//! information, so the score is `1 - p(word)`.

use std::sync::OnceLock;

use pyo3::prelude::*;
use pyo3::types::PyDict;

use super::errors::{SelectionError, SelectionResult};
use super::scorer::{ImportanceScorer, Word};

struct BertHandles {
    torch: Py<PyAny>,
    tokenizer: Py<PyAny>,
    model: Py<PyAny>,
    mask_token: String,
    mask_token_id: i64,
}

/// Importance scorer backed by a HuggingFace `BertForMaskedLM`.
///
/// The model is loaded on first use and never mutated afterwards. A failed
/// load is remembered, so every later call reports `ModelUnavailable`
/// without retrying.
pub struct BertScorer {
    model_name: String,
    loaded: OnceLock<Result<BertHandles, String>>,
}

impl BertScorer {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            loaded: OnceLock::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Load the model now instead of on the first highlight
    pub fn warm_up(&self) -> SelectionResult<()> {
        self.handles().map(|_| ())
    }

    fn handles(&self) -> SelectionResult<&BertHandles> {
        self.loaded
            .get_or_init(|| load(&self.model_name).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| SelectionError::ModelUnavailable(e.clone()))
    }
}

fn load(model_name: &str) -> PyResult<BertHandles> {
    log::info!("Loading masked language model {}", model_name);
    Python::attach(|py| {
        let torch = py.import("torch")?;
        torch.call_method1("set_grad_enabled", (false,))?;

        let transformers = py.import("transformers")?;
        let tokenizer = transformers
            .getattr("BertTokenizerFast")?
            .call_method1("from_pretrained", (model_name,))?;
        let model = transformers
            .getattr("BertForMaskedLM")?
            .call_method1("from_pretrained", (model_name,))?;
        model.call_method0("eval")?;

        let mask_token: String = tokenizer.getattr("mask_token")?.extract()?;
        let mask_token_id: i64 = tokenizer.getattr("mask_token_id")?.extract()?;

        Ok(BertHandles {
            torch: torch.into_any().unbind(),
            tokenizer: tokenizer.unbind(),
            model: model.unbind(),
            mask_token,
            mask_token_id,
        })
    })
}

/// `1 - p(original first word piece)` at the masked position.
///
/// NaN when the mask was truncated away or the word has no word piece.
fn score_word(py: Python<'_>, handles: &BertHandles, text: &str, word: &Word<'_>) -> PyResult<f32> {
    let tokenizer = handles.tokenizer.bind(py);
    let masked = format!("{}{}{}", &text[..word.start], handles.mask_token, &text[word.end..]);

    let kwargs = PyDict::new(py);
    kwargs.set_item("return_tensors", "pt")?;
    kwargs.set_item("truncation", true)?;
    let encoded = tokenizer.call((masked,), Some(&kwargs))?;

    let ids: Vec<Vec<i64>> = encoded.get_item("input_ids")?.call_method0("tolist")?.extract()?;
    let Some(mask_pos) = ids
        .first()
        .and_then(|row| row.iter().position(|&id| id == handles.mask_token_id))
    else {
        return Ok(f32::NAN);
    };

    let piece_kwargs = PyDict::new(py);
    piece_kwargs.set_item("add_special_tokens", false)?;
    let pieces: Vec<i64> = tokenizer
        .call((word.text,), Some(&piece_kwargs))?
        .get_item("input_ids")?
        .extract()?;
    let Some(&target) = pieces.first() else {
        return Ok(f32::NAN);
    };

    let model_kwargs = PyDict::new(py);
    for key in ["input_ids", "attention_mask", "token_type_ids"] {
        if let Ok(value) = encoded.get_item(key) {
            model_kwargs.set_item(key, value)?;
        }
    }
    let logits = handles.model.bind(py).call((), Some(&model_kwargs))?.getattr("logits")?;
    let row = logits.get_item((0, mask_pos))?;

    let softmax_kwargs = PyDict::new(py);
    softmax_kwargs.set_item("dim", -1)?;
    let probs = handles
        .torch
        .bind(py)
        .call_method("softmax", (row,), Some(&softmax_kwargs))?;
    let p: f64 = probs.get_item(target)?.call_method0("item")?.extract()?;

    Ok((1.0 - p) as f32)
}

impl ImportanceScorer for BertScorer {
    fn name(&self) -> &'static str {
        "bert"
    }

    fn score(&self, text: &str, candidates: &[Word<'_>]) -> SelectionResult<Vec<f32>> {
        let handles = self.handles()?;
        Python::attach(|py| {
            candidates
                .iter()
                .map(|word| score_word(py, handles, text, word))
                .collect::<PyResult<Vec<f32>>>()
        })
        .map_err(|e| SelectionError::Inference(e.to_string()))
    }
}
