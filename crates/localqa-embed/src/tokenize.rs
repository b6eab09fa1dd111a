use candle_core::{Device, Tensor};
use localqa_core::{Error, Result};
use tokenizers::Tokenizer;

/// Tokenize `text` into fixed-length `[1, max_len]` id and mask tensors,
/// truncating or padding (pad id 1, mask 0) as needed.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer
        .encode(text, true)
        .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    ids.truncate(max_len);
    mask.truncate(max_len);
    if ids.len() < max_len {
        let pad = max_len - ids.len();
        ids.extend(std::iter::repeat(1).take(pad));
        mask.extend(std::iter::repeat(0).take(pad));
    }
    let input_ids = Tensor::from_iter(ids, device).and_then(|t| t.reshape((1, max_len))).map_err(candle_err)?;
    let attention_mask = Tensor::from_iter(mask, device).and_then(|t| t.reshape((1, max_len))).map_err(candle_err)?;
    Ok((input_ids, attention_mask))
}

pub(crate) fn candle_err(e: candle_core::Error) -> Error {
    Error::Embedding(e.to_string())
}
