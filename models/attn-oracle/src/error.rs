use tune_common::CommonError;

/// Errors produced while running or comparing attention kernels.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The query, key and value do not describe a valid attention problem.
    #[error("invalid attention inputs: {0}")]
    InvalidShape(String),
    /// Two tensors that are compared element by element have different shapes.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The shape of the reference tensor
        expected: Vec<usize>,
        /// The shape of the tensor under test
        actual: Vec<usize>,
    },
    /// The kernel under test tiles the sequence in blocks that do not divide it.
    #[error("{kernel} needs the sequence length to be a multiple of {block_size}, got {seq_len}")]
    IncompatibleSequence {
        /// The name of the kernel
        kernel: String,
        /// The block size the kernel requires
        block_size: usize,
        /// The sequence length of the inputs
        seq_len: usize,
    },
    /// Reverse-mode differentiation did not reach one of the inputs.
    #[error("no gradient was produced for the {0}")]
    MissingGradient(&'static str),
    /// An error from the shared execution context.
    #[error(transparent)]
    Common(#[from] CommonError),
    /// A tensor operation failed.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result alias for [`OracleError`].
pub type Result<T, E = OracleError> = std::result::Result<T, E>;
