use tune_common::CommonError;

/// Errors produced while loading, tokenizing or batching a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The tokenizer failed on an input.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    /// A token has no id and the tokenizer has no unknown token to fall back to.
    #[error("Token {0:?} is not in the vocabulary")]
    UnknownToken(String),
    /// The configured end-of-sequence token is not in the vocabulary.
    #[error("End-of-sequence token {0:?} is not in the vocabulary")]
    MissingEosToken(String),
    /// The tokenizer produced no ids for a prompt.
    #[error("Tokenizing {0:?} produced no tokens")]
    EmptyTokenization(String),
    /// A requested split is not part of the dataset.
    #[error("Split {split:?} not found, available splits: {available:?}")]
    MissingSplit {
        /// The split that was requested
        split: String,
        /// The splits the dataset has
        available: Vec<String>,
    },
    /// The parallel feature columns do not all have the same number of rows.
    #[error("Feature columns are not aligned: {0:?} rows per column")]
    MisalignedColumns([usize; 5]),
    /// Batches must hold at least one example.
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
    /// A dataset file is not valid JSON for the expected record type.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reading a dataset file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Resolving a file source failed.
    #[error(transparent)]
    Common(#[from] CommonError),
    /// Building a batch tensor failed.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result alias for [`DataError`].
pub type Result<T, E = DataError> = std::result::Result<T, E>;
