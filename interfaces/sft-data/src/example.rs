use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::Result;

/// A raw text record: one sentence or a pair of sentences with an optional label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputExample {
    /// The position of the example in the dataset pass that produced it
    pub guid: usize,
    /// The first (or only) text
    pub text_a: String,
    /// The second text of a pair
    pub text_b: Option<String>,
    /// The class label, if the task has one
    pub label: Option<u32>,
}

impl InputExample {
    /// Create a new example.
    pub fn new(
        guid: usize,
        text_a: impl Into<String>,
        text_b: Option<String>,
        label: Option<u32>,
    ) -> Self {
        Self {
            guid,
            text_a: text_a.into(),
            text_b,
            label,
        }
    }

    /// Serialize to pretty-printed JSON with sorted keys and a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        to_sorted_json(self)
    }
}

impl Display for InputExample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = self.to_json_string().map_err(|_| std::fmt::Error)?;
        write!(f, "{json}")
    }
}

/// A tokenized example padded to a fixed length.
///
/// `input_ids`, `attention_mask` and `token_type_ids` always have the same
/// length; `input_len` is the number of real tokens before padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFeatures {
    /// Token ids, right-padded with zeros
    pub input_ids: Vec<u32>,
    /// `1` for real tokens and `0` for padding
    pub attention_mask: Vec<u32>,
    /// `0` for tokens of the first text and `1` for tokens of the second text
    pub token_type_ids: Vec<u32>,
    /// The class label carried over from the example
    pub label: Option<u32>,
    /// The number of tokens before padding
    pub input_len: usize,
}

impl InputFeatures {
    /// Serialize to pretty-printed JSON with sorted keys and a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        to_sorted_json(self)
    }
}

impl Display for InputFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = self.to_json_string().map_err(|_| std::fmt::Error)?;
        write!(f, "{json}")
    }
}

fn to_sorted_json(value: &impl Serialize) -> Result<String> {
    let fields: BTreeMap<String, serde_json::Value> =
        serde_json::from_value(serde_json::to_value(value)?)?;
    Ok(serde_json::to_string_pretty(&fields)? + "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn example_json_has_sorted_keys() {
        let example = InputExample::new(3, "the cat", Some("sat".to_string()), Some(1));
        assert_eq!(
            example.to_json_string().unwrap(),
            "{\n  \"guid\": 3,\n  \"label\": 1,\
             \n  \"text_a\": \"the cat\",\n  \"text_b\": \"sat\"\n}\n"
        );
        assert_eq!(example.to_string(), example.to_json_string().unwrap());
    }

    #[test]
    fn features_json_has_sorted_keys() {
        let features = InputFeatures {
            input_ids: vec![2, 0],
            attention_mask: vec![1, 0],
            token_type_ids: vec![0, 0],
            label: None,
            input_len: 1,
        };
        let json = features.to_json_string().unwrap();
        let keys: Vec<_> = json
            .lines()
            .filter(|l| l.starts_with("  \""))
            .map(|l| l.trim().split('"').nth(1).unwrap().to_string())
            .collect();
        assert_eq!(
            keys,
            ["attention_mask", "input_ids", "input_len", "label", "token_type_ids"]
        );
        let back: InputFeatures = serde_json::from_str(&json).unwrap();
        assert_eq!(back, features);
    }
}
