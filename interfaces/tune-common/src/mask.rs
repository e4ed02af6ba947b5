use candle_core::{Device, Result, Tensor};
use std::collections::HashMap;
use std::sync::RwLock;

/// Caches causal masks by (query length, key length).
///
/// A mask holds `1` where the query at row `i` may not see the key at column
/// `j` (that is `j > i`) and `0` on and below the diagonal.
#[derive(Default, Debug)]
pub struct MaskCache {
    masks: RwLock<HashMap<(usize, usize), Tensor>>,
}

impl MaskCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the `(q_len, k_len)` u8 causal mask on `device`, building it on first use.
    pub fn get_mask(&self, q_len: usize, k_len: usize, device: &Device) -> Result<Tensor> {
        if let Some(mask) = {
            let masks = self.masks.read().unwrap();
            masks.get(&(q_len, k_len)).cloned()
        } {
            if mask.device().same_device(device) {
                return Ok(mask);
            }
        }

        let mask: Vec<_> = (0..q_len)
            .flat_map(|i| (0..k_len).map(move |j| u8::from(j > i)))
            .collect();
        let mask = Tensor::from_slice(&mask, (q_len, k_len), device)?;
        let mut masks = self.masks.write().unwrap();
        masks.insert((q_len, k_len), mask.clone());
        Ok(mask)
    }

    /// Replace every score above the diagonal of the last two dimensions with
    /// negative infinity.
    pub fn apply(&self, scores: &Tensor) -> Result<Tensor> {
        let shape = scores.shape();
        let (q_len, k_len) = (
            scores.dim(candle_core::D::Minus2)?,
            scores.dim(candle_core::D::Minus1)?,
        );
        let mask = self
            .get_mask(q_len, k_len, scores.device())?
            .broadcast_as(shape)?;
        let on_true = Tensor::new(f32::NEG_INFINITY, scores.device())?
            .to_dtype(scores.dtype())?
            .broadcast_as(shape)?;
        mask.where_cond(&on_true, scores)
    }

    /// The number of distinct mask shapes currently cached.
    pub fn len(&self) -> usize {
        self.masks.read().unwrap().len()
    }

    /// Whether no mask has been built yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_hides_future_positions() -> Result<()> {
        let cache = MaskCache::new();
        let mask = cache.get_mask(3, 3, &Device::Cpu)?;
        assert_eq!(
            mask.to_vec2::<u8>()?,
            vec![vec![0, 1, 1], vec![0, 0, 1], vec![0, 0, 0]]
        );
        cache.get_mask(3, 3, &Device::Cpu)?;
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn apply_fills_upper_triangle_with_neg_infinity() -> Result<()> {
        let cache = MaskCache::new();
        let scores = Tensor::ones((1, 1, 2, 2), candle_core::DType::F32, &Device::Cpu)?;
        let masked = cache.apply(&scores)?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(masked, vec![1.0, f32::NEG_INFINITY, 1.0, 1.0]);
        Ok(())
    }
}
