use std::path::PathBuf;

/// Errors shared by every crate in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    /// The operator can not run on the device of the execution context.
    #[error("{operator} only supports GPU devices currently, got {device}")]
    UnsupportedDevice {
        /// The operator that was requested
        operator: String,
        /// A description of the device it was requested on
        device: String,
    },
    /// A local file source does not exist.
    #[error("File not found: {0}")]
    MissingFile(PathBuf),
    /// Resolving a file from the Hugging Face hub failed.
    #[error("Hugging Face API error: {0}")]
    HuggingFaceApi(#[from] hf_hub::api::sync::ApiError),
    /// A tensor operation failed.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result alias for [`CommonError`].
pub type Result<T, E = CommonError> = std::result::Result<T, E>;
