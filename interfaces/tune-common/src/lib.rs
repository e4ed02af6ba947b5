//! # Tune Common
//!
//! Shared plumbing for the attention oracle and the fine-tuning data tools: the
//! [`ExecutionContext`] that owns the device and profiler, the causal
//! [`MaskCache`], and [`FileSource`] resolution.

#![warn(missing_docs)]

mod context;
mod error;
mod mask;
mod profiler;
mod source;

pub use context::*;
pub use error::*;
pub use mask::*;
pub use profiler::*;
pub use source::*;
