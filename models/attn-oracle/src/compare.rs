use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};
use tune_common::{CommonError, ExecutionContext};

use crate::{check_qkv, AttentionInputs, AttentionKernel, OracleError, Result};

/// Tolerance for numeric comparison.
///
/// An element passes when either its absolute or its relative error is inside
/// the bound. Relative error is only measured where the reference magnitude is
/// above `1e-6`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Maximum absolute error allowed.
    pub max_abs_error: f32,
    /// Maximum relative error allowed.
    pub max_rel_error: f32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            max_abs_error: 1e-4,
            max_rel_error: 1e-3,
        }
    }
}

impl Tolerance {
    /// Stricter tolerance for kernels that should match the oracle closely.
    pub fn strict() -> Self {
        Self {
            max_abs_error: 1e-5,
            max_rel_error: 1e-4,
        }
    }

    /// Looser tolerance for GPU comparisons (FP precision differences).
    pub fn gpu_friendly() -> Self {
        Self {
            max_abs_error: 1e-3,
            max_rel_error: 1e-2,
        }
    }
}

/// Element-wise error between a reference tensor and a tensor under test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorDiff {
    /// Largest absolute error
    pub max_abs_error: f32,
    /// Mean absolute error
    pub mean_abs_error: f32,
    /// Largest relative error over elements whose reference magnitude is above `1e-6`
    pub max_rel_error: f32,
    /// Number of elements outside of the tolerance
    pub violations: usize,
}

impl TensorDiff {
    /// Compare `actual` against `expected` element by element.
    pub fn between(expected: &Tensor, actual: &Tensor, tolerance: &Tolerance) -> Result<Self> {
        if expected.dims() != actual.dims() {
            return Err(OracleError::ShapeMismatch {
                expected: expected.dims().to_vec(),
                actual: actual.dims().to_vec(),
            });
        }
        let expected = expected
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        let actual = actual
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;

        let mut max_abs = 0.0f32;
        let mut max_rel = 0.0f32;
        let mut sum_abs = 0.0f64;
        let mut violations = 0;
        for (r, c) in expected.iter().zip(actual.iter()) {
            let abs_err = (r - c).abs();
            max_abs = max_abs.max(abs_err);
            sum_abs += abs_err as f64;

            let rel_err = if r.abs() > 1e-6 {
                let rel_err = abs_err / r.abs();
                max_rel = max_rel.max(rel_err);
                rel_err
            } else {
                f32::INFINITY
            };
            // NaN never compares as inside the bound
            if !(abs_err <= tolerance.max_abs_error || rel_err <= tolerance.max_rel_error) {
                violations += 1;
            }
        }

        Ok(Self {
            max_abs_error: max_abs,
            mean_abs_error: if expected.is_empty() {
                0.0
            } else {
                (sum_abs / expected.len() as f64) as f32
            },
            max_rel_error: max_rel,
            violations,
        })
    }

    /// Whether every element was inside the tolerance.
    pub fn passed(&self) -> bool {
        self.violations == 0
    }
}

/// The result of checking a kernel against the oracle on one set of inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// The name of the kernel under test
    pub kernel: String,
    /// The tolerance the kernel was held to
    pub tolerance: Tolerance,
    /// Error of the forward output
    pub output: TensorDiff,
    /// Error of the query gradient
    pub grad_query: TensorDiff,
    /// Error of the key gradient
    pub grad_key: TensorDiff,
    /// Error of the value gradient
    pub grad_value: TensorDiff,
}

impl ComparisonReport {
    /// Whether the forward output and every gradient were inside the tolerance.
    pub fn passed(&self) -> bool {
        self.output.passed()
            && self.grad_query.passed()
            && self.grad_key.passed()
            && self.grad_value.passed()
    }
}

/// Run `reference` and `candidate` forward and backward on the same inputs and
/// measure how far the candidate is from the reference.
///
/// Fails before running anything if the candidate does not support the device
/// of `ctx` or if its block size does not divide the sequence length.
pub fn compare_kernels(
    ctx: &ExecutionContext,
    reference: &impl AttentionKernel,
    candidate: &impl AttentionKernel,
    inputs: &AttentionInputs,
    tolerance: Tolerance,
) -> Result<ComparisonReport> {
    ensure_runnable(ctx, candidate, inputs)?;
    let AttentionInputs { query, key, value } = inputs;

    let output = TensorDiff::between(
        &reference.forward(query, key, value)?,
        &candidate.forward(query, key, value)?,
        &tolerance,
    )?;
    let expected = reference.backward(query, key, value)?;
    let actual = candidate.backward(query, key, value)?;
    let report = ComparisonReport {
        kernel: candidate.name().to_string(),
        tolerance,
        output,
        grad_query: TensorDiff::between(&expected.query, &actual.query, &tolerance)?,
        grad_key: TensorDiff::between(&expected.key, &actual.key, &tolerance)?,
        grad_value: TensorDiff::between(&expected.value, &actual.value, &tolerance)?,
    };
    tracing::info!(
        kernel = %report.kernel,
        passed = report.passed(),
        output_max_abs = report.output.max_abs_error,
        dq_max_abs = report.grad_query.max_abs_error,
        dk_max_abs = report.grad_key.max_abs_error,
        dv_max_abs = report.grad_value.max_abs_error,
        "compared against {}",
        reference.name()
    );
    Ok(report)
}

/// Check the device and block size preconditions of `kernel` for these inputs.
pub fn ensure_runnable(
    ctx: &ExecutionContext,
    kernel: &impl AttentionKernel,
    inputs: &AttentionInputs,
) -> Result<()> {
    if !kernel.supports(ctx.device()) {
        return Err(CommonError::UnsupportedDevice {
            operator: kernel.name().to_string(),
            device: ctx.device_name(),
        }
        .into());
    }
    let (_, _, q_len, k_len, _) = check_qkv(&inputs.query, &inputs.key, &inputs.value)?;
    if let Some(block_size) = kernel.block_size() {
        for seq_len in [q_len, k_len] {
            if block_size == 0 || seq_len % block_size != 0 {
                return Err(OracleError::IncompatibleSequence {
                    kernel: kernel.name().to_string(),
                    block_size,
                    seq_len,
                });
            }
        }
    }
    Ok(())
}
