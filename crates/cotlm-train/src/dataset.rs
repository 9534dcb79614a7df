//! Encoding of CoT examples into fixed-shape seq2seq batches.
//!
//! Every example becomes one source row and one target row:
//!
//! ```text
//! source  "question: <question>"   → input_ids, attention_mask
//! target  "<answer>"               → labels
//! ```
//!
//! The answer is encoded whole, `Thought:` and `Final Answer:` markers
//! included.  Sources are right-padded with the pad id; targets are
//! right-padded with [`IGNORE_INDEX`] so padding never contributes to the
//! loss.  Padding is corpus-wide, so every batch has the same shape.

use anyhow::{ensure, Context, Result};
use tracing::info;

use cotlm_core::{prompt::format_training_input, CotExample};

use crate::tokenizer::Tokenizer;

/// Label value excluded from the loss.  Never a valid token id.
pub const IGNORE_INDEX: i64 = -100;

/// Maximum token lengths, end-of-sequence token included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeLimits {
    pub max_source_length: usize,
    pub max_target_length: usize,
}

impl Default for EncodeLimits {
    fn default() -> Self {
        Self { max_source_length: 512, max_target_length: 512 }
    }
}

/// The whole corpus, encoded and padded.
#[derive(Debug, Clone)]
pub struct EncodedCorpus {
    input_ids: Vec<Vec<u32>>,
    attention_mask: Vec<Vec<u32>>,
    labels: Vec<Vec<i64>>,
}

/// A contiguous slice of an [`EncodedCorpus`].
///
/// All three fields have shape `[batch, len]`; `input_ids` and
/// `attention_mask` share a length, `labels` has its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub input_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
    pub labels: Vec<Vec<i64>>,
}

/// Encode `examples` in order.  Any tokenizer failure aborts the whole call.
pub fn encode_corpus(
    examples: &[CotExample],
    tokenizer: &Tokenizer,
    limits: &EncodeLimits,
) -> Result<EncodedCorpus> {
    ensure!(!examples.is_empty(), "Training corpus is empty");
    ensure!(
        limits.max_source_length > 0 && limits.max_target_length > 0,
        "Maximum source and target lengths must be positive"
    );

    let eos = tokenizer.eos_token_id();
    let pad = tokenizer.pad_token_id();

    let mut sources = Vec::with_capacity(examples.len());
    let mut targets = Vec::with_capacity(examples.len());

    for (i, ex) in examples.iter().enumerate() {
        let source = encode_with_eos(tokenizer, &format_training_input(&ex.question), eos, limits.max_source_length)
            .with_context(|| format!("Cannot encode question of example #{i}"))?;
        let target = encode_with_eos(tokenizer, &ex.answer, eos, limits.max_target_length)
            .with_context(|| format!("Cannot encode answer of example #{i}"))?;
        sources.push(source);
        targets.push(target);
    }

    let source_len = sources.iter().map(Vec::len).max().unwrap_or(0);
    let target_len = targets.iter().map(Vec::len).max().unwrap_or(0);

    let mut input_ids = Vec::with_capacity(sources.len());
    let mut attention_mask = Vec::with_capacity(sources.len());
    for mut ids in sources {
        let real = ids.len();
        ids.resize(source_len, pad);
        let mut mask = vec![1u32; real];
        mask.resize(source_len, 0);
        input_ids.push(ids);
        attention_mask.push(mask);
    }

    let labels: Vec<Vec<i64>> = targets
        .into_iter()
        .map(|ids| {
            let mut row: Vec<i64> = ids.into_iter().map(i64::from).collect();
            row.resize(target_len, IGNORE_INDEX);
            row
        })
        .collect();

    info!(examples = examples.len(), source_len, target_len, "Corpus encoded");
    Ok(EncodedCorpus { input_ids, attention_mask, labels })
}

/// Encode `text`, truncate to `max_len`, and make sure the row ends in `eos`.
fn encode_with_eos(tokenizer: &Tokenizer, text: &str, eos: u32, max_len: usize) -> Result<Vec<u32>> {
    let mut ids = tokenizer.encode(text, true)?;
    if ids.last() == Some(&eos) {
        ids.pop();
    }
    ids.truncate(max_len - 1);
    ids.push(eos);
    Ok(ids)
}

impl EncodedCorpus {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    pub fn source_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }

    pub fn target_len(&self) -> usize {
        self.labels.first().map_or(0, Vec::len)
    }

    /// Split into consecutive batches of `batch_size` rows; the last one may
    /// be shorter.
    pub fn batches(&self, batch_size: usize) -> Vec<EncodedBatch> {
        let batch_size = batch_size.max(1);
        (0..self.len())
            .step_by(batch_size)
            .map(|start| {
                let end = (start + batch_size).min(self.len());
                EncodedBatch {
                    input_ids: self.input_ids[start..end].to_vec(),
                    attention_mask: self.attention_mask[start..end].to_vec(),
                    labels: self.labels[start..end].to_vec(),
                }
            })
            .collect()
    }
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.len()
    }

    pub fn source_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }

    pub fn target_len(&self) -> usize {
        self.labels.first().map_or(0, Vec::len)
    }

    /// Number of label positions that count towards the loss.
    pub fn target_token_count(&self) -> usize {
        self.labels.iter().flatten().filter(|&&l| l != IGNORE_INDEX).count()
    }

    /// Number of real (non-padding) source tokens.
    pub fn source_token_count(&self) -> usize {
        self.attention_mask.iter().flatten().filter(|&&m| m == 1).count()
    }

    /// Teacher-forcing decoder input: `start` followed by the labels shifted
    /// one position right, with ignored positions replaced by `pad`.
    pub fn decoder_input_ids(&self, start: u32, pad: u32) -> Vec<Vec<u32>> {
        self.labels
            .iter()
            .map(|row| {
                std::iter::once(start)
                    .chain(
                        row.iter()
                            .take(row.len().saturating_sub(1))
                            .map(|&l| if l == IGNORE_INDEX { pad } else { l as u32 }),
                    )
                    .collect()
            })
            .collect()
    }
}
