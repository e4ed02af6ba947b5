use std::path::PathBuf;

use candle_core::Device;
use pretty_assertions::assert_eq;
use sft_data::{
    generate_prompt, get_dataloader_from_ds, load_examples, tokenize_prompt, AlpacaRecord,
    DataError, HfTokenizer, JsonDatasetLoader, LoadConfig, PromptConfig, TextTokenizer,
};
use tokenizers::Tokenizer;
use tune_common::FileSource;

const VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "</s>", "Below", "is", "an", "instruction", "that", "describes", "a",
    "task", ".", "Write", "response", "appropriately", "completes", "the", "request", "###",
    "Instruction", "Input", "Response", ":", "Name", "color", "sky", "blue", "green", "grass",
    "Add", "numbers", "two", "four", "six",
];

fn word_level_tokenizer(post_processor: serde_json::Value) -> anyhow::Result<Tokenizer> {
    let vocab: serde_json::Map<String, serde_json::Value> = VOCAB
        .iter()
        .enumerate()
        .map(|(i, token)| (token.to_string(), i.into()))
        .collect();
    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": post_processor,
        "decoder": null,
        "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
    });
    Tokenizer::from_bytes(json.to_string()).map_err(anyhow::Error::msg)
}

fn plain_tokenizer() -> anyhow::Result<HfTokenizer> {
    Ok(HfTokenizer::new(word_level_tokenizer(serde_json::Value::Null)?, "</s>")?)
}

/// Appends `</s>` after every sequence.
fn eos_appending_tokenizer() -> anyhow::Result<HfTokenizer> {
    let eos = VOCAB.iter().position(|t| *t == "</s>").unwrap_or_default();
    let post_processor = serde_json::json!({
        "type": "TemplateProcessing",
        "single": [
            { "Sequence": { "id": "A", "type_id": 0 } },
            { "SpecialToken": { "id": "</s>", "type_id": 0 } }
        ],
        "pair": [
            { "Sequence": { "id": "A", "type_id": 0 } },
            { "Sequence": { "id": "B", "type_id": 1 } },
            { "SpecialToken": { "id": "</s>", "type_id": 1 } }
        ],
        "special_tokens": {
            "</s>": { "id": "</s>", "ids": [eos], "tokens": ["</s>"] }
        }
    });
    let tokenizer = HfTokenizer::new(word_level_tokenizer(post_processor)?, "</s>")?;
    Ok(tokenizer.with_special_tokens(true))
}

fn records() -> Vec<AlpacaRecord> {
    vec![
        AlpacaRecord {
            instruction: "Name the color of the sky".to_string(),
            input: String::new(),
            output: "blue".to_string(),
        },
        AlpacaRecord {
            instruction: "Name the color of grass".to_string(),
            input: String::new(),
            output: "green".to_string(),
        },
        AlpacaRecord {
            instruction: "Add two numbers".to_string(),
            input: "two four".to_string(),
            output: "six".to_string(),
        },
        AlpacaRecord {
            instruction: "Write a response".to_string(),
            input: String::new(),
            output: "a response".to_string(),
        },
    ]
}

fn write_records(name: &str) -> anyhow::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("sft-data-{}-{name}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_vec(&records())?)?;
    Ok(path)
}

#[test]
fn prompts_end_with_eos() -> anyhow::Result<()> {
    let tokenizer = plain_tokenizer()?;
    let prompt = generate_prompt(&records()[0]);
    let tokenized = tokenize_prompt(&prompt, &tokenizer, &PromptConfig::default())?;
    assert_eq!(tokenized.input_ids.last(), Some(&tokenizer.eos_token_id()));
    assert_eq!(tokenized.labels, tokenized.input_ids);
    assert!(tokenized.attention_mask.iter().all(|m| *m == 1));

    let config = PromptConfig::default().max_length(4);
    let truncated = tokenize_prompt(&prompt, &tokenizer, &config)?;
    assert_eq!(truncated.input_ids.len(), 4);
    assert_ne!(truncated.input_ids.last(), Some(&tokenizer.eos_token_id()));
    Ok(())
}

#[test]
fn train_split_is_featurized_and_batched() -> anyhow::Result<()> {
    let path = write_records("train")?;
    let loader = JsonDatasetLoader::<AlpacaRecord>::new()
        .with_split("train", FileSource::local(&path))
        .with_test_fraction(0.25);
    let tokenizer = plain_tokenizer()?;
    let config = LoadConfig::default().max_seq_length(48).seed(3);

    let columns = load_examples(&loader, &tokenizer, &config)?;
    assert_eq!(columns.len(), 3);
    for (ids, len) in columns.input_ids.iter().zip(&columns.lengths) {
        assert_eq!(ids.len(), 48);
        assert!(*len <= 48);
        assert!(ids[*len..].iter().all(|id| *id == 0));
    }
    assert!(columns.labels.iter().all(Option::is_none));
    // Output tokens are typed as the second segment.
    assert!(columns.token_type_ids.iter().all(|types| types.contains(&1)));

    let again = load_examples(&loader, &tokenizer, &config)?;
    assert_eq!(again, columns);

    let batches = get_dataloader_from_ds(&columns, 2, &Device::Cpu)?
        .collect::<Result<Vec<_>, DataError>>()?;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].input_ids.dims(), &[2, 48]);
    assert_eq!(batches[1].attention_mask.dims(), &[1, 48]);
    assert!(batches[1].labels.is_none());

    let test = load_examples(&loader, &tokenizer, &config.clone().split("test"))?;
    assert_eq!(test.len(), 1);

    std::fs::remove_file(path)?;
    Ok(())
}

#[test]
fn missing_split_is_reported() -> anyhow::Result<()> {
    let path = write_records("missing")?;
    let loader = JsonDatasetLoader::<AlpacaRecord>::new()
        .with_split("train", FileSource::local(&path));
    let tokenizer = plain_tokenizer()?;
    let config = LoadConfig::default().split("validation");
    let err = load_examples(&loader, &tokenizer, &config).unwrap_err();
    assert!(matches!(err, DataError::MissingSplit { .. }));
    std::fs::remove_file(path)?;
    Ok(())
}

#[test]
fn length_limit_keeps_special_tokens() -> anyhow::Result<()> {
    let tokenizer = eos_appending_tokenizer()?;
    let eos = tokenizer.eos_token_id();

    let full = tokenizer.tokenize_to_ids("Name the color of the sky", None)?;
    assert_eq!(full.input_ids.len(), 7);
    assert_eq!(full.input_ids.last(), Some(&eos));

    let limited = tokenizer.tokenize_to_ids("Name the color of the sky", Some(3))?;
    assert_eq!(limited.input_ids, vec![full.input_ids[0], full.input_ids[1], eos]);
    assert_eq!(limited.attention_mask, vec![1, 1, 1]);

    // A second call with the same limit reuses the truncating tokenizer.
    let again = tokenizer.tokenize_to_ids("Name the color of the sky", Some(3))?;
    assert_eq!(again, limited);

    assert!(matches!(
        tokenizer.tokenize_to_ids("Name the sky", Some(0)),
        Err(DataError::Tokenizer(_))
    ));
    Ok(())
}
