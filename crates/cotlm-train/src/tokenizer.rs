use std::path::Path;

use anyhow::{anyhow, Result};
use tokenizers::Tokenizer as HfTokenizer;
use tracing::debug;

const PAD_CANDIDATES: &[&str] = &["<pad>", "[PAD]", "<|pad|>"];
const EOS_CANDIDATES: &[&str] = &["</s>", "<|endoftext|>", "<eos>"];

/// Thin wrapper around a `tokenizer.json` loaded with the `tokenizers` crate.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    inner: HfTokenizer,
    pad_token_id: u32,
    eos_token_id: u32,
}

impl Tokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    ///
    /// Seq2seq training needs both a padding and an end-of-sequence token; a
    /// file that defines neither is rejected here rather than mid-training.
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = HfTokenizer::from_file(path)
            .map_err(|e| anyhow!("Cannot load tokenizer {}: {e}", path.display()))?;

        let pad_token_id = special_token_id(&inner, PAD_CANDIDATES)
            .ok_or_else(|| anyhow!("Tokenizer {} has no padding token", path.display()))?;
        let eos_token_id = special_token_id(&inner, EOS_CANDIDATES)
            .ok_or_else(|| anyhow!("Tokenizer {} has no end-of-sequence token", path.display()))?;

        debug!(
            pad_token_id,
            eos_token_id,
            vocab_size = inner.get_vocab_size(true),
            "Tokenizer loaded from file"
        );

        Ok(Self { inner, pad_token_id, eos_token_id })
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| anyhow!("Tokenisation failed: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| anyhow!("Detokenisation failed: {e}"))
    }

    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Write the tokenizer back out as `tokenizer.json`-format JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner
            .save(path, true)
            .map_err(|e| anyhow!("Cannot save tokenizer to {}: {e}", path.display()))
    }
}

fn special_token_id(tokenizer: &HfTokenizer, candidates: &[&str]) -> Option<u32> {
    let vocab = tokenizer.get_vocab(true);
    candidates.iter().find_map(|c| vocab.get(*c).copied())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn stub_tokenizer_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-data/stub_tokenizer.json")
    }

    pub(crate) fn stub_tokenizer() -> Tokenizer {
        Tokenizer::from_file(&stub_tokenizer_path())
            .expect("test-data/stub_tokenizer.json must exist")
    }

    #[test]
    fn stub_special_tokens() {
        let tok = stub_tokenizer();
        assert_eq!(tok.pad_token_id(), 0);
        assert_eq!(tok.eos_token_id(), 1);
    }

    #[test]
    fn encode_known_and_unknown_words() {
        let tok = stub_tokenizer();
        let ids = tok.encode("question: what is zzzz", false).unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[3], 2, "unknown word must map to <unk>");
    }

    #[test]
    fn decode_skips_special_tokens() {
        let tok = stub_tokenizer();
        let ids = tok.encode("Final Answer: 4", false).unwrap();
        let mut with_eos = ids.clone();
        with_eos.push(tok.eos_token_id());
        assert_eq!(tok.decode(&with_eos, true).unwrap(), "Final Answer: 4");
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tokenizer.json");
        let tok = stub_tokenizer();
        tok.save(&path).unwrap();

        let back = Tokenizer::from_file(&path).unwrap();
        assert_eq!(back.vocab_size(), tok.vocab_size());
        assert_eq!(
            back.encode("Thought: add", false).unwrap(),
            tok.encode("Thought: add", false).unwrap()
        );
    }
}
