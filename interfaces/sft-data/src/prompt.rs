use serde::{Deserialize, Serialize};

use crate::{DataError, ExampleSource, Result, TextTokenizer, TokenizedText};

/// One instruction-following record in the Alpaca format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlpacaRecord {
    /// The task to perform
    pub instruction: String,
    /// Optional context for the task
    #[serde(default)]
    pub input: String,
    /// The expected response
    #[serde(default)]
    pub output: String,
}

/// Render the Alpaca instruction prompt for a record.
pub fn generate_prompt(record: &AlpacaRecord) -> String {
    if !record.input.is_empty() {
        return format!(
            "Below is an instruction that describes a task, paired with an input that \
             provides further context. \
             Write a response that appropriately completes the request.\n\n\
             ### Instruction:\n{}\n\n### Input:\n{}\n\n### Response:",
            record.instruction, record.input
        );
    }
    format!(
        "Below is an instruction that describes a task. \
         Write a response that appropriately completes the request.\n\n\
         ### Instruction:\n{}\n\n### Response:",
        record.instruction
    )
}

/// Settings for [`tokenize_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Prompts are truncated to this many tokens
    pub max_length: usize,
    /// Append the end-of-sequence token when there is room for it
    pub add_eos_token: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_length: 256,
            add_eos_token: true,
        }
    }
}

impl PromptConfig {
    /// Set the truncation length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set whether to append the end-of-sequence token.
    pub fn add_eos_token(mut self, add_eos_token: bool) -> Self {
        self.add_eos_token = add_eos_token;
        self
    }
}

/// A prompt tokenized for causal language modeling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedPrompt {
    /// Token ids
    pub input_ids: Vec<u32>,
    /// `1` for every token
    pub attention_mask: Vec<u32>,
    /// Next-token targets, a copy of `input_ids`
    pub labels: Vec<u32>,
}

/// Tokenize a prompt without padding, truncating it to `config.max_length`.
///
/// The end-of-sequence id is appended (with a mask entry of `1`) unless the
/// ids already end with it, there is no room left, or `add_eos_token` is off.
pub fn tokenize_prompt(
    prompt: &str,
    tokenizer: &impl TextTokenizer,
    config: &PromptConfig,
) -> Result<TokenizedPrompt> {
    let TokenizedText {
        mut input_ids,
        mut attention_mask,
    } = tokenizer.tokenize_to_ids(prompt, Some(config.max_length))?;
    let Some(&last) = input_ids.last() else {
        return Err(DataError::EmptyTokenization(prompt.to_string()));
    };
    let eos_token_id = tokenizer.eos_token_id();
    if last != eos_token_id && input_ids.len() < config.max_length && config.add_eos_token {
        input_ids.push(eos_token_id);
        attention_mask.push(1);
    }
    let labels = input_ids.clone();
    Ok(TokenizedPrompt {
        input_ids,
        attention_mask,
        labels,
    })
}

/// An Alpaca record together with its rendered and tokenized prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRow {
    /// The source record
    pub record: AlpacaRecord,
    /// The rendered prompt
    pub prompt: String,
    /// The tokenized prompt
    pub tokenized: TokenizedPrompt,
}

/// Render a record's prompt and tokenize it.
pub fn generate_and_tokenize_prompt(
    record: AlpacaRecord,
    tokenizer: &impl TextTokenizer,
    config: &PromptConfig,
) -> Result<PromptRow> {
    let prompt = generate_prompt(&record);
    let tokenized = tokenize_prompt(&prompt, tokenizer, config)?;
    Ok(PromptRow {
        record,
        prompt,
        tokenized,
    })
}

impl ExampleSource for PromptRow {
    fn text_a(&self) -> &str {
        &self.prompt
    }

    fn text_b(&self) -> Option<&str> {
        Some(self.record.output.as_str())
    }

    fn label(&self) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::WordTokenizer;
    use pretty_assertions::assert_eq;

    #[test]
    fn prompt_without_input() {
        let record = AlpacaRecord {
            instruction: "Name a color.".to_string(),
            ..Default::default()
        };
        assert_eq!(
            generate_prompt(&record),
            "Below is an instruction that describes a task. \
             Write a response that appropriately completes the request.\n\n\
             ### Instruction:\nName a color.\n\n### Response:"
        );
    }

    #[test]
    fn prompt_with_input() {
        let record = AlpacaRecord {
            instruction: "Translate.".to_string(),
            input: "bonjour".to_string(),
            output: "hello".to_string(),
        };
        let prompt = generate_prompt(&record);
        assert!(prompt.starts_with(
            "Below is an instruction that describes a task, paired with an input that provides"
        ));
        assert!(prompt.ends_with(
            "### Instruction:\nTranslate.\n\n### Input:\nbonjour\n\n### Response:"
        ));
    }

    #[test]
    fn eos_is_appended_once() -> Result<()> {
        let tokenizer = WordTokenizer::new();
        let result = tokenize_prompt("the cat sat", &tokenizer, &PromptConfig::default())?;
        assert_eq!(result.input_ids, vec![2, 3, 4, 1]);
        assert_eq!(result.attention_mask, vec![1, 1, 1, 1]);
        assert_eq!(result.labels, result.input_ids);
        Ok(())
    }

    #[test]
    fn existing_eos_is_not_duplicated() -> Result<()> {
        let tokenizer = WordTokenizer::new();
        let result = tokenize_prompt("the cat </s>", &tokenizer, &PromptConfig::default())?;
        assert_eq!(result.input_ids, vec![2, 3, 1]);
        assert_eq!(result.attention_mask.len(), 3);
        Ok(())
    }

    #[test]
    fn full_prompts_get_no_eos() -> Result<()> {
        let tokenizer = WordTokenizer::new();
        let config = PromptConfig::default().max_length(3);
        let result = tokenize_prompt("the cat sat on the mat", &tokenizer, &config)?;
        assert_eq!(result.input_ids, vec![2, 3, 4]);
        assert_eq!(result.labels, vec![2, 3, 4]);

        let config = PromptConfig::default().add_eos_token(false);
        let result = tokenize_prompt("the cat", &tokenizer, &config)?;
        assert_eq!(result.input_ids, vec![2, 3]);
        Ok(())
    }

    #[test]
    fn empty_prompts_are_an_error() {
        let tokenizer = WordTokenizer::new();
        let err = tokenize_prompt("   ", &tokenizer, &PromptConfig::default()).unwrap_err();
        assert!(matches!(err, DataError::EmptyTokenization(_)));
    }
}
