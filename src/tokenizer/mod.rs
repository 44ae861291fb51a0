//! Tokenizer boundary.
//!
//! The embedding stage only needs text turned into ids that index its table;
//! any tokenizer that implements [`TextEncoder`] can feed it.

pub mod ascii;

pub use ascii::AsciiTokenizer;

use crate::error::Result;

/// Maps raw text to token ids.
pub trait TextEncoder {
    /// Encode `text` into token ids, each below [`TextEncoder::vocab_size`].
    ///
    /// # Errors
    /// Returns an error if the underlying tokenizer fails.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Number of distinct ids the encoder can produce.
    fn vocab_size(&self) -> usize;
}

#[cfg(feature = "hf-tokenizers")]
impl TextEncoder for tokenizers::Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = tokenizers::Tokenizer::encode(self, text, false)
            .map_err(|e| crate::error::AttentionError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn vocab_size(&self) -> usize {
        self.get_vocab_size(true)
    }
}

/// Load a HuggingFace `tokenizer.json`.
///
/// # Errors
/// Returns [`AttentionError::Tokenizer`](crate::error::AttentionError::Tokenizer)
/// if the file cannot be parsed.
#[cfg(feature = "hf-tokenizers")]
pub fn load_hf_tokenizer(path: &std::path::Path) -> Result<tokenizers::Tokenizer> {
    tokenizers::Tokenizer::from_file(path)
        .map_err(|e| crate::error::AttentionError::Tokenizer(e.to_string()))
}
