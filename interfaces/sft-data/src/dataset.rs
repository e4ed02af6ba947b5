use std::collections::BTreeMap;
use std::marker::PhantomData;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tune_common::FileSource;

use crate::{DataError, InputExample, Result};

/// A dataset row that can be turned into an [`InputExample`].
pub trait ExampleSource {
    /// The first (or only) text
    fn text_a(&self) -> &str;
    /// The second text of a pair
    fn text_b(&self) -> Option<&str>;
    /// The class label
    fn label(&self) -> Option<u32>;
}

/// A plain text pair with a class label, the record format of pair classification datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledPair {
    /// The first text
    pub text_a: String,
    /// The second text
    #[serde(default)]
    pub text_b: Option<String>,
    /// The class label
    #[serde(default)]
    pub label: Option<u32>,
}

impl ExampleSource for LabeledPair {
    fn text_a(&self) -> &str {
        &self.text_a
    }

    fn text_b(&self) -> Option<&str> {
        self.text_b.as_deref()
    }

    fn label(&self) -> Option<u32> {
        self.label
    }
}

/// Turn dataset rows into examples, numbering them in iteration order.
///
/// The rows are consumed as the returned iterator is advanced.
pub fn convert_dataset_to_examples<R: ExampleSource>(
    rows: impl IntoIterator<Item = R>,
) -> impl Iterator<Item = InputExample> {
    rows.into_iter().enumerate().map(|(i, row)| InputExample {
        guid: i,
        text_a: row.text_a().to_string(),
        text_b: row.text_b().map(str::to_string),
        label: row.label(),
    })
}

/// One named split of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T> {
    name: String,
    rows: Vec<T>,
}

impl<T> Split<T> {
    /// Create a split from its rows.
    pub fn new(name: impl Into<String>, rows: Vec<T>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// The name of the split.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the split has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows in their current order.
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// Shuffle the rows.
    pub fn shuffle(mut self, rng: &mut impl Rng) -> Self {
        self.rows.shuffle(rng);
        self
    }

    /// Lazily apply `f` to every row in order.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> impl Iterator<Item = U> {
        self.rows.into_iter().map(f)
    }
}

impl<T> IntoIterator for Split<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// A dataset as a set of named splits.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDict<T> {
    splits: BTreeMap<String, Split<T>>,
}

impl<T> Default for DatasetDict<T> {
    fn default() -> Self {
        Self {
            splits: BTreeMap::new(),
        }
    }
}

impl<T> DatasetDict<T> {
    /// Add or replace a split.
    pub fn insert(&mut self, split: Split<T>) {
        self.splits.insert(split.name.clone(), split);
    }

    /// The names of all splits.
    pub fn split_names(&self) -> Vec<String> {
        self.splits.keys().cloned().collect()
    }

    /// Borrow a split.
    pub fn get(&self, name: &str) -> Option<&Split<T>> {
        self.splits.get(name)
    }

    /// Take a split out of the dataset.
    pub fn take(&mut self, name: &str) -> Result<Split<T>> {
        let available = self.split_names();
        self.splits
            .remove(name)
            .ok_or_else(|| DataError::MissingSplit {
                split: name.to_string(),
                available,
            })
    }
}

/// Something that can load named splits of a dataset.
pub trait DatasetLoader {
    /// The record type of every row
    type Row;

    /// Load the requested splits of the dataset `name`.
    fn load_dataset(&self, name: &str, splits: &[&str]) -> Result<DatasetDict<Self::Row>>;
}

/// Loads datasets stored as JSON arrays of records, one file per split.
///
/// When only a `train` file is registered, a `test` split can be carved off
/// its tail with [`JsonDatasetLoader::with_test_fraction`].
pub struct JsonDatasetLoader<R> {
    files: BTreeMap<String, FileSource>,
    test_fraction: Option<f32>,
    phantom: PhantomData<R>,
}

impl<R> Default for JsonDatasetLoader<R> {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            test_fraction: None,
            phantom: PhantomData,
        }
    }
}

impl<R: DeserializeOwned> JsonDatasetLoader<R> {
    /// Create a loader with no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the file that holds a split.
    pub fn with_split(mut self, split: impl Into<String>, source: FileSource) -> Self {
        self.files.insert(split.into(), source);
        self
    }

    /// Hold out this fraction of `train` as `test` when no `test` file is registered.
    pub fn with_test_fraction(mut self, fraction: f32) -> Self {
        self.test_fraction = Some(fraction.clamp(0.0, 1.0));
        self
    }

    fn read_split(&self, split: &str) -> Result<Vec<R>> {
        let source = self
            .files
            .get(split)
            .ok_or_else(|| DataError::MissingSplit {
                split: split.to_string(),
                available: self.files.keys().cloned().collect(),
            })?;
        let path = source.resolve()?;
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// The fraction of `train` that is held out as `test`, if `test` has no file of its own.
    fn held_out(&self) -> Option<f32> {
        self.test_fraction
            .filter(|_| !self.files.contains_key("test"))
    }
}

fn split_point(len: usize, held_out: f32) -> usize {
    let test_len = (len as f32 * held_out).round() as usize;
    len - test_len.min(len)
}

impl JsonDatasetLoader<crate::AlpacaRecord> {
    /// The cleaned Alpaca instruction dataset on the Hugging Face hub.
    pub fn alpaca() -> Self {
        Self::new()
            .with_split(
                "train",
                FileSource::dataset("yahma/alpaca-cleaned", "main", "alpaca_data_cleaned.json"),
            )
            .with_test_fraction(0.1)
    }
}

impl<R: DeserializeOwned> DatasetLoader for JsonDatasetLoader<R> {
    type Row = R;

    fn load_dataset(&self, name: &str, splits: &[&str]) -> Result<DatasetDict<R>> {
        let mut dataset = DatasetDict::default();
        for &split in splits {
            let rows = match (split, self.held_out()) {
                ("train", Some(held_out)) => {
                    let mut rows = self.read_split("train")?;
                    rows.truncate(split_point(rows.len(), held_out));
                    rows
                }
                ("test", Some(held_out)) => {
                    let mut rows = self.read_split("train")?;
                    rows.split_off(split_point(rows.len(), held_out))
                }
                _ => self.read_split(split)?,
            };
            tracing::info!(dataset = name, split, rows = rows.len(), "loaded split");
            dataset.insert(Split::new(split, rows));
        }
        Ok(dataset)
    }
}
