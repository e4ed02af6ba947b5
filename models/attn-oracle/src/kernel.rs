use candle_core::{Device, Tensor};

use crate::{OracleError, Result};

/// Gradients of the attention output with respect to each input.
///
/// The output is differentiated as a whole, which is the same as
/// differentiating the sum of all its elements.
#[derive(Debug, Clone)]
pub struct AttentionGradients {
    /// d(output)/d(query)
    pub query: Tensor,
    /// d(output)/d(key)
    pub key: Tensor,
    /// d(output)/d(value)
    pub value: Tensor,
}

/// A causal self-attention implementation over `(batch, heads, seq, head_dim)` tensors.
///
/// The reference oracle implements this trait, and so does every kernel that
/// is checked or profiled against it.
pub trait AttentionKernel {
    /// A human readable name for logs and reports.
    fn name(&self) -> &str;

    /// Whether the kernel can run on `device`.
    fn supports(&self, device: &Device) -> bool {
        let _ = device;
        true
    }

    /// The block size the sequence length must be a multiple of, if any.
    fn block_size(&self) -> Option<usize> {
        None
    }

    /// Compute the attention output.
    fn forward(&self, query: &Tensor, key: &Tensor, value: &Tensor) -> Result<Tensor>;

    /// Compute the gradients of the attention output with respect to the inputs.
    fn backward(&self, query: &Tensor, key: &Tensor, value: &Tensor) -> Result<AttentionGradients>;
}

/// Check that query, key and value form a valid attention problem and return
/// `(batch, heads, q_len, k_len, head_dim)`.
pub fn check_qkv(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
) -> Result<(usize, usize, usize, usize, usize)> {
    let (b, h, q_len, d) = dims4(query, "query")?;
    let (kb, kh, k_len, kd) = dims4(key, "key")?;
    let (vb, vh, v_len, _) = dims4(value, "value")?;
    if (b, h) != (kb, kh) || (b, h) != (vb, vh) {
        return Err(OracleError::InvalidShape(format!(
            "batch and head dimensions differ: query {:?}, key {:?}, value {:?}",
            query.dims(),
            key.dims(),
            value.dims()
        )));
    }
    if d != kd {
        return Err(OracleError::InvalidShape(format!(
            "query head_dim {d} does not match key head_dim {kd}"
        )));
    }
    if k_len != v_len {
        return Err(OracleError::InvalidShape(format!(
            "key length {k_len} does not match value length {v_len}"
        )));
    }
    Ok((b, h, q_len, k_len, d))
}

fn dims4(tensor: &Tensor, name: &str) -> Result<(usize, usize, usize, usize)> {
    match *tensor.dims() {
        [b, h, s, d] => Ok((b, h, s, d)),
        ref dims => Err(OracleError::InvalidShape(format!("{name} must be rank 4, got {dims:?}"))),
    }
}
