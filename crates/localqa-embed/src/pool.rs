use candle_core::{DType, Tensor};
use localqa_core::{Error, Result};

use crate::tokenize::candle_err;

/// Mean-pool `hidden` (`[B, T, H]`) over the positions where
/// `attention_mask` (`[B, T]`) is set, then L2-normalize each row.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    if dims.len() != 3 {
        return Err(Error::Embedding(format!("hidden shape must be [B,T,H], got {dims:?}")));
    }
    let batch = dims[0];
    let hidden_dim = dims[2];

    let pooled = (|| -> candle_core::Result<Tensor> {
        let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
        let mask_3d = mask.unsqueeze(2)?;
        let mask_broadcast = match mask_3d.broadcast_as(hidden.shape()) {
            Ok(m) => m,
            Err(_) => mask_3d.repeat((1, 1, hidden_dim))?,
        };
        let masked = (hidden * &mask_broadcast)?;
        let sum = masked.sum(1)?;
        let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?;
        let mean = sum.broadcast_div(&lengths)?;
        let eps_val = match hidden.dtype() {
            DType::F16 => 1e-6f32,
            _ => 1e-12f32,
        };
        let eps = Tensor::new(&[eps_val], hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(0)?;
        let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
        mean.broadcast_div(&norm)
    })()
    .map_err(candle_err)?;

    if pooled.dims() != [batch, hidden_dim] {
        return Err(Error::Embedding(format!("pooled shape {:?} != [{batch}, {hidden_dim}]", pooled.dims())));
    }
    Ok(pooled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn masked_mean_l2_basic() {
        let dev = Device::Cpu;
        // Two tokens with hidden dim 4; second token is masked out.
        let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], (1, 2, 4), &dev).unwrap();
        let mask = Tensor::from_slice(&[1i64, 0i64], (1, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
        let out = masked_mean_l2(&h, &mask).unwrap();
        let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
        let norm: f32 = (1.0f32 + 4.0 + 9.0 + 16.0).sqrt();
        for (a, b) in v[0].iter().copied().zip([1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm]) {
            assert!((a - b).abs() < 1e-5, "a={a} b={b}");
        }
    }
}
