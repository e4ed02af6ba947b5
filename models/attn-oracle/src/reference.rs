use candle_core::{Tensor, Var, D};
use tune_common::MaskCache;

use crate::{check_qkv, AttentionGradients, AttentionKernel, OracleError, Result};

/// The reference causal self-attention oracle.
///
/// The forward pass is
/// `softmax(causal_mask((Q / D^¼) · (Kᵀ / D^¼))) · V`. Query and key are
/// each divided by the fourth root of the head dimension before the matmul,
/// rather than dividing the scores by `sqrt(D)` afterwards.
///
/// The backward pass differentiates that same function with candle's
/// reverse-mode autodiff.
#[derive(Debug)]
pub struct ReferenceAttention {
    masks: MaskCache,
    span: tracing::Span,
    span_backward: tracing::Span,
}

impl Default for ReferenceAttention {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceAttention {
    /// Create a new oracle with an empty mask cache.
    pub fn new() -> Self {
        Self {
            masks: MaskCache::new(),
            span: tracing::span!(tracing::Level::TRACE, "reference-attn"),
            span_backward: tracing::span!(tracing::Level::TRACE, "reference-attn-backward"),
        }
    }

    /// The causally masked, row-normalized attention weights `(B, H, Sq, Sk)`.
    pub fn attention_probs(&self, query: &Tensor, key: &Tensor) -> Result<Tensor> {
        let embed_size = query.dim(D::Minus1)?;
        let scaling_factor = (embed_size as f32).sqrt().sqrt() as f64;
        let query = (query / scaling_factor)?;
        let key = (key.transpose(D::Minus2, D::Minus1)? / scaling_factor)?;
        let attn = query.contiguous()?.matmul(&key.contiguous()?)?;
        let attn = self.masks.apply(&attn)?;
        Ok(candle_nn::ops::softmax(&attn, D::Minus1)?)
    }

    /// Compute the attention output `(B, H, Sq, D)`.
    pub fn forward(&self, query: &Tensor, key: &Tensor, value: &Tensor) -> Result<Tensor> {
        let _enter = self.span.enter();
        check_qkv(query, key, value)?;
        let attn = self.attention_probs(query, key)?;
        Ok(attn.matmul(&value.contiguous()?)?)
    }

    /// Compute the gradients of [`Self::forward`] with respect to query, key and value.
    pub fn backward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
    ) -> Result<AttentionGradients> {
        let _enter = self.span_backward.enter();
        let query = Var::from_tensor(query)?;
        let key = Var::from_tensor(key)?;
        let value = Var::from_tensor(value)?;
        let output = self.forward(query.as_tensor(), key.as_tensor(), value.as_tensor())?;
        let grads = output.sum_all()?.backward()?;
        let grad = |var: &Var, name: &'static str| {
            grads
                .get(var.as_tensor())
                .cloned()
                .ok_or(OracleError::MissingGradient(name))
        };
        Ok(AttentionGradients {
            query: grad(&query, "query")?,
            key: grad(&key, "key")?,
            value: grad(&value, "value")?,
        })
    }
}

impl AttentionKernel for ReferenceAttention {
    fn name(&self) -> &str {
        "reference-attention"
    }

    fn forward(&self, query: &Tensor, key: &Tensor, value: &Tensor) -> Result<Tensor> {
        ReferenceAttention::forward(self, query, key, value)
    }

    fn backward(&self, query: &Tensor, key: &Tensor, value: &Tensor) -> Result<AttentionGradients> {
        ReferenceAttention::backward(self, query, key, value)
    }
}
