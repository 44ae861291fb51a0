//! Character-level tokenizer over printable ASCII.
//!
//! - `<PAD>` is ID 0, `<UNK>` is ID 1, `<NEWLINE>` is ID 2
//! - Printable ASCII (0x20..=0x7E) occupies IDs 3..=97

use super::TextEncoder;
use crate::error::Result;

/// Special token IDs.
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const NEWLINE_ID: u32 = 2;

pub const NUM_SPECIAL_TOKENS: u32 = 3;

pub const PRINTABLE_ASCII_START: u32 = NUM_SPECIAL_TOKENS; // 3
pub const PRINTABLE_ASCII_LEN: u32 = 95; // 0x20..=0x7E inclusive
pub const PRINTABLE_ASCII_END: u32 = PRINTABLE_ASCII_START + PRINTABLE_ASCII_LEN - 1; // 97

/// Total vocabulary size: 3 special tokens + 95 printable ASCII = 98.
pub const VOCAB_SIZE: u32 = NUM_SPECIAL_TOKENS + PRINTABLE_ASCII_LEN;

/// Stateless character-level tokenizer with a fixed mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiTokenizer;

impl AsciiTokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode a single character into a token ID.
    #[must_use]
    pub fn encode_char(self, ch: char) -> u32 {
        if ch == '\n' {
            return NEWLINE_ID;
        }
        let cp = ch as u32;
        if (0x20..=0x7E).contains(&cp) {
            return PRINTABLE_ASCII_START + (cp - 0x20);
        }
        UNK_ID
    }

    /// Decode a token ID into a character.
    ///
    /// Returns `None` for `<PAD>`, `<UNK>` and ids outside the vocabulary.
    #[must_use]
    pub fn decode_token(self, token_id: u32) -> Option<char> {
        if token_id == NEWLINE_ID {
            return Some('\n');
        }
        if (PRINTABLE_ASCII_START..=PRINTABLE_ASCII_END).contains(&token_id) {
            return char::from_u32(0x20 + token_id - PRINTABLE_ASCII_START);
        }
        None
    }

    /// Decode a token sequence into a string, skipping special tokens.
    #[must_use]
    pub fn decode(self, token_ids: &[u32]) -> String {
        token_ids
            .iter()
            .filter_map(|&tid| self.decode_token(tid))
            .collect()
    }
}

impl TextEncoder for AsciiTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(|ch| self.encode_char(ch)).collect())
    }

    fn vocab_size(&self) -> usize {
        VOCAB_SIZE as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_size() {
        assert_eq!(AsciiTokenizer::new().vocab_size(), 98);
        assert_eq!(PRINTABLE_ASCII_END, 97);
    }

    #[test]
    fn test_specific_char_mappings() {
        let tok = AsciiTokenizer::new();
        assert_eq!(tok.encode_char(' '), 3);
        assert_eq!(tok.encode_char('~'), 97);
        assert_eq!(tok.encode_char('\n'), NEWLINE_ID);
        assert_eq!(tok.encode_char('é'), UNK_ID);
        assert_eq!(tok.encode_char('\t'), UNK_ID);
    }

    #[test]
    fn test_simple_roundtrip() {
        let tok = AsciiTokenizer::new();
        let text = "how are you doing! this is";
        let ids = tok.encode(text).unwrap();
        assert_eq!(ids.len(), text.len());
        assert_eq!(tok.decode(&ids), text);
    }

    #[test]
    fn test_ids_fit_vocabulary() {
        let tok = AsciiTokenizer::new();
        let ids = tok.encode("line one\nline two ✓").unwrap();
        assert!(ids.iter().all(|&id| (id as usize) < tok.vocab_size()));
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let tok = AsciiTokenizer::new();
        let h = tok.encode_char('h');
        let i = tok.encode_char('i');
        assert_eq!(tok.decode(&[PAD_ID, h, UNK_ID, i, 500]), "hi");
    }
}
