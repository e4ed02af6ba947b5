use std::time::Duration;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use tune_common::ExecutionContext;

use crate::{check_qkv, ensure_runnable, AttentionKernel, Result};

/// The `(batch, heads, seq_len, head_dim)` shape of an attention problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionShape {
    /// Batch size
    pub batch: usize,
    /// Number of attention heads
    pub heads: usize,
    /// Sequence length
    pub seq_len: usize,
    /// Dimension of each head
    pub head_dim: usize,
}

impl Default for AttentionShape {
    fn default() -> Self {
        Self {
            batch: 8,
            heads: 12,
            seq_len: 32,
            head_dim: 64,
        }
    }
}

impl AttentionShape {
    /// Create a new shape.
    pub fn new(batch: usize, heads: usize, seq_len: usize, head_dim: usize) -> Self {
        Self {
            batch,
            heads,
            seq_len,
            head_dim,
        }
    }

    /// The shape as a tuple of dimensions.
    pub fn dims(&self) -> (usize, usize, usize, usize) {
        (self.batch, self.heads, self.seq_len, self.head_dim)
    }
}

/// A query, key and value triple.
#[derive(Debug, Clone)]
pub struct AttentionInputs {
    /// The query `(B, H, S, D)`
    pub query: Tensor,
    /// The key `(B, H, S, D)`
    pub key: Tensor,
    /// The value `(B, H, S, D)`
    pub value: Tensor,
}

impl AttentionInputs {
    /// Wrap existing tensors, checking that they form a valid attention problem.
    pub fn new(query: Tensor, key: Tensor, value: Tensor) -> Result<Self> {
        check_qkv(&query, &key, &value)?;
        Ok(Self { query, key, value })
    }

    /// Standard normal f32 inputs of the given shape.
    pub fn random(shape: &AttentionShape, device: &Device) -> Result<Self> {
        let dims = shape.dims();
        Ok(Self {
            query: Tensor::randn(0f32, 1f32, dims, device)?,
            key: Tensor::randn(0f32, 1f32, dims, device)?,
            value: Tensor::randn(0f32, 1f32, dims, device)?,
        })
    }
}

/// How many iterations to run around the profiled region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Forward+backward iterations run before the profiled region opens
    pub warmup_iterations: usize,
    /// Forward+backward iterations inside the profiled region
    pub profiled_iterations: usize,
    /// The shape of the random inputs
    pub shape: AttentionShape,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 5,
            profiled_iterations: 10,
            shape: AttentionShape::default(),
        }
    }
}

impl ProfileConfig {
    /// Set the number of warmup iterations.
    pub fn warmup_iterations(mut self, warmup_iterations: usize) -> Self {
        self.warmup_iterations = warmup_iterations;
        self
    }

    /// Set the number of profiled iterations.
    pub fn profiled_iterations(mut self, profiled_iterations: usize) -> Self {
        self.profiled_iterations = profiled_iterations;
        self
    }

    /// Set the input shape.
    pub fn shape(mut self, shape: AttentionShape) -> Self {
        self.shape = shape;
        self
    }
}

/// Timings collected by [`profile_attention`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    /// The name of the kernel that was profiled
    pub kernel: String,
    /// The shape of the inputs
    pub shape: AttentionShape,
    /// Iterations inside the profiled region
    pub iterations: usize,
    /// Wall time of the profiled region
    pub total: Duration,
}

impl ProfileReport {
    /// Average wall time of one forward+backward iteration.
    pub fn per_iteration(&self) -> Duration {
        if self.iterations == 0 {
            Duration::ZERO
        } else {
            self.total / self.iterations as u32
        }
    }
}

/// Run `kernel` forward and backward on random inputs, first outside and then
/// inside a profiler step of `ctx`.
pub fn profile_attention(
    ctx: &ExecutionContext,
    kernel: &impl AttentionKernel,
    config: &ProfileConfig,
) -> Result<ProfileReport> {
    let inputs = AttentionInputs::random(&config.shape, ctx.device())?;
    ensure_runnable(ctx, kernel, &inputs)?;
    let AttentionInputs { query, key, value } = &inputs;

    tracing::info!(kernel = kernel.name(), shape = ?config.shape, "profiling forward+backward");
    for _ in 0..config.warmup_iterations {
        kernel.forward(query, key, value)?;
        kernel.backward(query, key, value)?;
    }
    ctx.synchronize()?;

    let step = ctx.profile_step("attention-forward-backward");
    for _ in 0..config.profiled_iterations {
        kernel.forward(query, key, value)?;
        kernel.backward(query, key, value)?;
    }
    let total = step.finish()?;

    let report = ProfileReport {
        kernel: kernel.name().to_string(),
        shape: config.shape,
        iterations: config.profiled_iterations,
        total,
    };
    tracing::info!(
        kernel = %report.kernel,
        iterations = report.iterations,
        per_iteration_ms = report.per_iteration().as_secs_f64() * 1000.0,
        "profiled"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReferenceAttention;

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ProfileConfig =
            serde_json::from_str(r#"{"profiled_iterations": 3, "shape": {"seq_len": 16}}"#)
                .unwrap();
        assert_eq!(config.warmup_iterations, 5);
        assert_eq!(config.profiled_iterations, 3);
        assert_eq!(config.shape, AttentionShape::new(8, 12, 16, 64));
    }

    #[test]
    fn profiles_the_reference_on_cpu() -> Result<()> {
        let ctx = ExecutionContext::cpu();
        let config = ProfileConfig::default()
            .warmup_iterations(1)
            .profiled_iterations(2)
            .shape(AttentionShape::new(1, 2, 4, 8));
        let report = profile_attention(&ctx, &ReferenceAttention::new(), &config)?;
        assert_eq!(report.iterations, 2);
        assert_eq!(report.kernel, "reference-attention");
        assert_eq!(ctx.profiler().steps_started(), 1);
        assert!(report.per_iteration() <= report.total);
        Ok(())
    }
}
