use serde::{Deserialize, Serialize};

use crate::{InputExample, InputFeatures, Result, TextTokenizer};

/// Settings for [`convert_examples_to_features`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// The length every feature is truncated and padded to
    pub max_seq_length: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_seq_length: 512,
        }
    }
}

impl FeatureConfig {
    /// Create a config with the given maximum sequence length.
    pub fn new(max_seq_length: usize) -> Self {
        Self { max_seq_length }
    }
}

/// Truncate a pair of sequences until their combined length is at most `max_length`.
///
/// One token is removed at a time from the end of the longer sequence. When
/// both have the same length the token comes off `tokens_b`.
pub fn truncate_seq_pair<T>(
    mut tokens_a: Vec<T>,
    mut tokens_b: Vec<T>,
    max_length: usize,
) -> (Vec<T>, Vec<T>) {
    while tokens_a.len() + tokens_b.len() > max_length {
        if tokens_a.len() > tokens_b.len() {
            tokens_a.pop();
        } else {
            tokens_b.pop();
        }
    }
    (tokens_a, tokens_b)
}

/// Tokenize, truncate and zero-pad every example to `config.max_seq_length`.
///
/// Tokens of `text_a` get type id `0` and tokens of `text_b` get type id `1`.
/// The first feature is logged for inspection.
///
/// # Panics
///
/// If a padded field does not end up exactly `max_seq_length` long.
pub fn convert_examples_to_features(
    examples: impl IntoIterator<Item = InputExample>,
    tokenizer: &impl TextTokenizer,
    config: &FeatureConfig,
) -> Result<Vec<InputFeatures>> {
    let max_seq_length = config.max_seq_length;
    let mut features = Vec::new();

    for (ex_index, example) in examples.into_iter().enumerate() {
        let tokens_a = tokenizer.tokenize_to_tokens(&example.text_a)?;
        let tokens_b = match example.text_b.as_deref() {
            Some(text_b) if !text_b.is_empty() => Some(tokenizer.tokenize_to_tokens(text_b)?),
            _ => None,
        };
        let (tokens_a, tokens_b) = match tokens_b {
            Some(tokens_b) => {
                let (a, b) = truncate_seq_pair(tokens_a, tokens_b, max_seq_length);
                (a, Some(b))
            }
            None => {
                let mut tokens_a = tokens_a;
                tokens_a.truncate(max_seq_length);
                (tokens_a, None)
            }
        };

        let mut tokens = Vec::with_capacity(max_seq_length);
        let mut token_type_ids = Vec::with_capacity(max_seq_length);
        for token in tokens_a {
            tokens.push(token);
            token_type_ids.push(0);
        }
        for token in tokens_b.into_iter().flatten() {
            tokens.push(token);
            token_type_ids.push(1);
        }

        let mut input_ids = tokenizer.convert_tokens_to_ids(&tokens)?;
        let mut attention_mask = vec![1; input_ids.len()];
        let input_len = input_ids.len();

        // Zero-pad up to the sequence length.
        while input_ids.len() < max_seq_length {
            input_ids.push(0);
            attention_mask.push(0);
            token_type_ids.push(0);
        }

        assert_eq!(input_ids.len(), max_seq_length);
        assert_eq!(attention_mask.len(), max_seq_length);
        assert_eq!(token_type_ids.len(), max_seq_length);

        if ex_index < 1 {
            tracing::info!(
                guid = example.guid,
                tokens = %tokens.join(" "),
                input_ids = %join(&input_ids),
                attention_mask = %join(&attention_mask),
                token_type_ids = %join(&token_type_ids),
                label = ?example.label,
                input_len,
                "*** Example ***"
            );
        }

        features.push(InputFeatures {
            input_ids,
            attention_mask,
            token_type_ids,
            label: example.label,
            input_len,
        });
    }
    Ok(features)
}

fn join(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::WordTokenizer;
    use pretty_assertions::assert_eq;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn longer_sequence_loses_tokens_first() {
        let (a, b) = truncate_seq_pair(strings(&["a", "b", "c"]), strings(&["x", "y"]), 4);
        assert_eq!(a, strings(&["a", "b"]));
        assert_eq!(b, strings(&["x", "y"]));
    }

    #[test]
    fn ties_shorten_the_second_sequence() {
        let (a, b) = truncate_seq_pair(vec![1, 2], vec![3, 4], 3);
        assert_eq!(a, vec![1, 2]);
        assert_eq!(b, vec![3]);

        let (a, b) = truncate_seq_pair(vec![1, 2, 3], vec![4, 5, 6], 2);
        assert_eq!(a, vec![1]);
        assert_eq!(b, vec![4]);
    }

    #[test]
    fn truncated_length_is_min_of_total_and_max() {
        for len_a in 0..6 {
            for len_b in 0..6 {
                for max_length in 0..12 {
                    let (a, b) = truncate_seq_pair(vec![0; len_a], vec![1; len_b], max_length);
                    assert_eq!(a.len() + b.len(), (len_a + len_b).min(max_length));
                    assert!(a.len() <= len_a && b.len() <= len_b);
                    // Neither side is cut below the other unless it started shorter.
                    if a.len() < len_a && b.len() < len_b {
                        assert!(a.len().abs_diff(b.len()) <= 1);
                        assert!(b.len() <= a.len());
                    }
                }
            }
        }
    }

    #[test]
    fn pairs_are_typed_and_padded() -> Result<()> {
        let tokenizer = WordTokenizer::new();
        let examples = vec![InputExample::new(
            0,
            "the cat sat",
            Some("on the mat".to_string()),
            Some(1),
        )];
        let features = convert_examples_to_features(examples, &tokenizer, &FeatureConfig::new(8))?;
        assert_eq!(features.len(), 1);
        let f = &features[0];
        assert_eq!(f.input_ids, vec![2, 3, 4, 5, 2, 6, 0, 0]);
        assert_eq!(f.token_type_ids, vec![0, 0, 0, 1, 1, 1, 0, 0]);
        assert_eq!(f.attention_mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
        assert_eq!(f.input_len, 6);
        assert_eq!(f.label, Some(1));
        Ok(())
    }

    #[test]
    fn single_text_is_hard_truncated() -> Result<()> {
        let tokenizer = WordTokenizer::new();
        let examples = vec![
            InputExample::new(0, "the cat sat on the mat", None, None),
            InputExample::new(1, "a dog ran", Some(String::new()), None),
        ];
        let features = convert_examples_to_features(examples, &tokenizer, &FeatureConfig::new(4))?;
        assert_eq!(features[0].input_ids, vec![2, 3, 4, 5]);
        assert_eq!(features[0].attention_mask, vec![1, 1, 1, 1]);
        assert_eq!(features[0].input_len, 4);
        // An empty second text counts as no second text.
        assert_eq!(features[1].token_type_ids, vec![0, 0, 0, 0]);
        assert_eq!(features[1].input_ids, vec![7, 8, 9, 0]);
        Ok(())
    }

    #[test]
    fn every_feature_has_fixed_length_and_leading_mask() -> Result<()> {
        let tokenizer = WordTokenizer::new();
        let texts = [
            "the",
            "the cat",
            "a dog ran on the mat",
            "",
            "cat cat cat cat cat",
        ];
        for max_seq_length in [0, 1, 3, 7] {
            let examples = texts.iter().enumerate().flat_map(|(i, a)| {
                texts
                    .iter()
                    .map(move |b| InputExample::new(i, *a, Some(b.to_string()), None))
            });
            let features = convert_examples_to_features(
                examples,
                &tokenizer,
                &FeatureConfig::new(max_seq_length),
            )?;
            for f in features {
                assert_eq!(f.input_ids.len(), max_seq_length);
                assert_eq!(f.attention_mask.len(), max_seq_length);
                assert_eq!(f.token_type_ids.len(), max_seq_length);
                assert!(f.input_len <= max_seq_length);
                assert!(f.attention_mask[..f.input_len].iter().all(|m| *m == 1));
                assert!(f.attention_mask[f.input_len..].iter().all(|m| *m == 0));
            }
        }
        Ok(())
    }

    #[test]
    fn unknown_tokens_propagate() {
        let tokenizer = WordTokenizer::new();
        let examples = vec![InputExample::new(0, "zebra", None, None)];
        let config = FeatureConfig::new(4);
        let err = convert_examples_to_features(examples, &tokenizer, &config).unwrap_err();
        assert!(matches!(err, crate::DataError::UnknownToken(t) if t == "zebra"));
    }
}
