//! # sft-data
//!
//! Dataset preparation for supervised fine-tuning.
//!
//! - [`convert_examples_to_features`] turns [`InputExample`] text pairs into
//!   fixed-length [`InputFeatures`] (token ids, attention mask, token type ids).
//! - [`tokenize_prompt`] tokenizes an instruction prompt for causal language
//!   modeling, appending the end-of-sequence token and copying the ids into
//!   the labels.
//! - [`load_examples`] and [`get_dataloader_from_ds`] glue a
//!   [`DatasetLoader`] to a sequential loader of batched candle tensors.

#![warn(missing_docs)]

mod dataset;
mod error;
mod example;
mod features;
mod loader;
mod prompt;
mod tokenizer;

pub use dataset::*;
pub use error::*;
pub use example::*;
pub use features::*;
pub use loader::*;
pub use prompt::*;
pub use tokenizer::*;
