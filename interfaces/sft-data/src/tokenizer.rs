use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use tokenizers::{Encoding, PostProcessor, Tokenizer, TruncationParams};
use tune_common::FileSource;

use crate::{DataError, Result};

/// Token ids and their attention mask, as returned by [`TextTokenizer::tokenize_to_ids`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedText {
    /// Token ids
    pub input_ids: Vec<u32>,
    /// `1` for every token the model should attend to
    pub attention_mask: Vec<u32>,
}

/// The tokenizer operations the dataset pipeline needs.
pub trait TextTokenizer {
    /// Split text into subword tokens without adding special tokens.
    fn tokenize_to_tokens(&self, text: &str) -> Result<Vec<String>>;

    /// Encode text into ids, keeping at most `max_length` of them, special tokens
    /// included. Nothing is padded.
    fn tokenize_to_ids(&self, text: &str, max_length: Option<usize>) -> Result<TokenizedText>;

    /// Map tokens produced by [`Self::tokenize_to_tokens`] to their ids.
    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>>;

    /// The id of the end-of-sequence token.
    fn eos_token_id(&self) -> u32;
}

/// A [`TextTokenizer`] backed by a Hugging Face `tokenizers` tokenizer.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
    eos_token_id: u32,
    unk_token_id: Option<u32>,
    add_special_tokens: bool,
    truncating: RwLock<HashMap<usize, Tokenizer>>,
}

impl HfTokenizer {
    /// Wrap a tokenizer, looking up the id of `eos_token` in its vocabulary.
    pub fn new(tokenizer: Tokenizer, eos_token: &str) -> Result<Self> {
        let eos_token_id = tokenizer
            .token_to_id(eos_token)
            .ok_or_else(|| DataError::MissingEosToken(eos_token.to_string()))?;
        Ok(Self {
            tokenizer,
            eos_token_id,
            unk_token_id: None,
            add_special_tokens: false,
            truncating: RwLock::new(HashMap::new()),
        })
    }

    /// Load a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>, eos_token: &str) -> Result<Self> {
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| DataError::Tokenizer(e.to_string()))?;
        Self::new(tokenizer, eos_token)
    }

    /// Load a `tokenizer.json` file from a local path or the Hugging Face hub.
    pub fn from_source(source: &FileSource, eos_token: &str) -> Result<Self> {
        let path = source.resolve()?;
        tracing::debug!("loading tokenizer from {source}");
        Self::from_file(path, eos_token)
    }

    /// Map tokens missing from the vocabulary to `unk_token` instead of failing.
    pub fn with_unk_token(mut self, unk_token: &str) -> Result<Self> {
        let id = self
            .tokenizer
            .token_to_id(unk_token)
            .ok_or_else(|| DataError::UnknownToken(unk_token.to_string()))?;
        self.unk_token_id = Some(id);
        Ok(self)
    }

    /// Whether [`TextTokenizer::tokenize_to_ids`] runs the tokenizer's post-processor.
    pub fn with_special_tokens(mut self, add_special_tokens: bool) -> Self {
        self.add_special_tokens = add_special_tokens;
        self
    }

    /// The wrapped tokenizer.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Encode with the tokenizer's own truncation, so the limit also counts the
    /// special tokens the post-processor adds.
    fn encode_truncated(&self, text: &str, max_length: usize) -> Result<Encoding> {
        let cached = self
            .truncating
            .read()
            .ok()
            .and_then(|cache| cache.get(&max_length).cloned());
        let tokenizer = match cached {
            Some(tokenizer) => tokenizer,
            None => {
                let added = self
                    .tokenizer
                    .get_post_processor()
                    .map_or(0, |processor| processor.added_tokens(false));
                if max_length < added {
                    return Err(DataError::Tokenizer(format!(
                        "max length {max_length} leaves no room for {added} special tokens"
                    )));
                }
                let mut tokenizer = self.tokenizer.clone();
                tokenizer
                    .with_truncation(Some(TruncationParams {
                        max_length,
                        ..Default::default()
                    }))
                    .map_err(|e| DataError::Tokenizer(e.to_string()))?;
                if let Ok(mut cache) = self.truncating.write() {
                    cache.insert(max_length, tokenizer.clone());
                }
                tokenizer
            }
        };
        tokenizer
            .encode(text, self.add_special_tokens)
            .map_err(|e| DataError::Tokenizer(e.to_string()))
    }
}

impl TextTokenizer for HfTokenizer {
    fn tokenize_to_tokens(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| DataError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_tokens().to_vec())
    }

    fn tokenize_to_ids(&self, text: &str, max_length: Option<usize>) -> Result<TokenizedText> {
        let encoding = match max_length {
            Some(max_length) => self.encode_truncated(text, max_length)?,
            None => self
                .tokenizer
                .encode(text, self.add_special_tokens)
                .map_err(|e| DataError::Tokenizer(e.to_string()))?,
        };
        Ok(TokenizedText {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>> {
        tokens
            .iter()
            .map(|token| {
                self.tokenizer
                    .token_to_id(token)
                    .or(self.unk_token_id)
                    .ok_or_else(|| DataError::UnknownToken(token.clone()))
            })
            .collect()
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}
