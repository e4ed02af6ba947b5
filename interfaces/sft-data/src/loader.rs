use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::{
    convert_dataset_to_examples, convert_examples_to_features, generate_and_tokenize_prompt,
    AlpacaRecord, DataError, DatasetLoader, FeatureConfig, InputFeatures, PromptConfig, Result,
    TextTokenizer,
};

/// Settings for [`load_examples`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// The dataset name passed to the loader
    pub dataset: String,
    /// The split to featurize
    pub split: String,
    /// Feature conversion settings
    pub features: FeatureConfig,
    /// Prompt tokenization settings
    pub prompt: PromptConfig,
    /// Seed for the shuffle, random when unset
    pub seed: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            dataset: "yahma/alpaca-cleaned".to_string(),
            split: "train".to_string(),
            features: FeatureConfig::default(),
            prompt: PromptConfig::default(),
            seed: None,
        }
    }
}

impl LoadConfig {
    /// Set the split to featurize.
    pub fn split(mut self, split: impl Into<String>) -> Self {
        self.split = split.into();
        self
    }

    /// Set the length features are padded to.
    pub fn max_seq_length(mut self, max_seq_length: usize) -> Self {
        self.features.max_seq_length = max_seq_length;
        self
    }

    /// Set the shuffle seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Features laid out as five parallel columns, aligned by index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumns {
    /// Padded token ids of every feature
    pub input_ids: Vec<Vec<u32>>,
    /// Attention masks of every feature
    pub attention_mask: Vec<Vec<u32>>,
    /// Token type ids of every feature
    pub token_type_ids: Vec<Vec<u32>>,
    /// Unpadded lengths of every feature
    pub lengths: Vec<usize>,
    /// Labels of every feature
    pub labels: Vec<Option<u32>>,
}

impl FeatureColumns {
    /// Split features into columns, keeping their order.
    pub fn from_features(features: impl IntoIterator<Item = InputFeatures>) -> Self {
        let mut columns = Self::default();
        for f in features {
            columns.input_ids.push(f.input_ids);
            columns.attention_mask.push(f.attention_mask);
            columns.token_type_ids.push(f.token_type_ids);
            columns.lengths.push(f.input_len);
            columns.labels.push(f.label);
        }
        columns
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_aligned(&self) -> Result<()> {
        let lens = [
            self.input_ids.len(),
            self.attention_mask.len(),
            self.token_type_ids.len(),
            self.lengths.len(),
            self.labels.len(),
        ];
        if lens.iter().any(|len| *len != lens[0]) {
            return Err(DataError::MisalignedColumns(lens));
        }
        Ok(())
    }
}

/// Load a split of an instruction dataset and featurize it.
///
/// Only the split named by `config.split` is loaded. It is shuffled once,
/// each record's prompt is rendered and tokenized lazily as the features are
/// built, and the features come back as parallel columns.
pub fn load_examples<L>(
    loader: &L,
    tokenizer: &impl TextTokenizer,
    config: &LoadConfig,
) -> Result<FeatureColumns>
where
    L: DatasetLoader<Row = AlpacaRecord>,
{
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut dataset = loader.load_dataset(&config.dataset, &[config.split.as_str()])?;
    let split = dataset.take(&config.split)?.shuffle(&mut rng);

    let mut error = None;
    let rows = split
        .map(|record| generate_and_tokenize_prompt(record, tokenizer, &config.prompt))
        .map_while(|row| row.map_err(|e| error = Some(e)).ok());
    let examples = convert_dataset_to_examples(rows);
    let features = convert_examples_to_features(examples, tokenizer, &config.features)?;
    if let Some(error) = error {
        return Err(error);
    }

    tracing::info!(split = %config.split, features = features.len(), "converted examples");
    Ok(FeatureColumns::from_features(features))
}

/// One batch of features as `u32` tensors.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(batch, max_seq_length)` token ids
    pub input_ids: Tensor,
    /// `(batch, max_seq_length)` attention mask
    pub attention_mask: Tensor,
    /// `(batch, max_seq_length)` token type ids
    pub token_type_ids: Tensor,
    /// `(batch,)` unpadded lengths
    pub lengths: Tensor,
    /// `(batch,)` labels, present only when every row in the batch has one
    pub labels: Option<Tensor>,
}

/// Batches feature columns in their stored order.
pub struct SequentialDataLoader<'a> {
    columns: &'a FeatureColumns,
    batch_size: usize,
    device: Device,
    position: usize,
}

impl SequentialDataLoader<'_> {
    /// The number of batches the loader yields in total, counting a final partial batch.
    pub fn num_batches(&self) -> usize {
        self.columns.len().div_ceil(self.batch_size)
    }

    fn batch(&self, start: usize, end: usize) -> Result<Batch> {
        let rows = end - start;
        let stack = |column: &[Vec<u32>]| -> Result<Tensor> {
            let width = column.first().map(Vec::len).unwrap_or(0);
            let flat: Vec<u32> = column.iter().flatten().copied().collect();
            Ok(Tensor::from_vec(flat, (rows, width), &self.device)?)
        };
        let lengths: Vec<u32> = self.columns.lengths[start..end]
            .iter()
            .map(|len| *len as u32)
            .collect();
        let labels = self.columns.labels[start..end]
            .iter()
            .copied()
            .collect::<Option<Vec<u32>>>()
            .map(|labels| Tensor::from_vec(labels, rows, &self.device))
            .transpose()?;
        Ok(Batch {
            input_ids: stack(&self.columns.input_ids[start..end])?,
            attention_mask: stack(&self.columns.attention_mask[start..end])?,
            token_type_ids: stack(&self.columns.token_type_ids[start..end])?,
            lengths: Tensor::from_vec(lengths, rows, &self.device)?,
            labels,
        })
    }
}

impl Iterator for SequentialDataLoader<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.columns.len() {
            return None;
        }
        let start = self.position;
        let end = (start + self.batch_size).min(self.columns.len());
        self.position = end;
        Some(self.batch(start, end))
    }
}

/// Wrap feature columns in a sequential, non-shuffling batch loader.
pub fn get_dataloader_from_ds<'a>(
    columns: &'a FeatureColumns,
    batch_size: usize,
    device: &Device,
) -> Result<SequentialDataLoader<'a>> {
    if batch_size == 0 {
        return Err(DataError::InvalidBatchSize);
    }
    columns.check_aligned()?;
    Ok(SequentialDataLoader {
        columns,
        batch_size,
        device: device.clone(),
        position: 0,
    })
}
