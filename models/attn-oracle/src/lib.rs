//! # attn-oracle
//!
//! A reference implementation of scaled dot-product causal self-attention,
//! written directly in [Candle](https://github.com/huggingface/candle) tensor
//! algebra. It serves as the oracle a fused attention kernel is checked
//! against, both for the forward output and for the gradients with respect to
//! the query, key and value.
//!
//! ## Usage
//!
//! ```rust, no_run
//! use attn_oracle::*;
//! use tune_common::ExecutionContext;
//!
//! fn main() -> Result<(), OracleError> {
//!     let ctx = ExecutionContext::cpu();
//!     let inputs = AttentionInputs::random(&AttentionShape::default(), ctx.device())?;
//!     let oracle = ReferenceAttention::new();
//!     let output = oracle.forward(&inputs.query, &inputs.key, &inputs.value)?;
//!     let grads = oracle.backward(&inputs.query, &inputs.key, &inputs.value)?;
//!     println!("{output:?} {:?}", grads.query);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod compare;
mod error;
mod kernel;
mod profile;
mod reference;

pub use crate::compare::*;
pub use crate::error::*;
pub use crate::kernel::*;
pub use crate::profile::*;
pub use crate::reference::*;
