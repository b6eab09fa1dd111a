use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use localqa_core::traits::Embedder;
use localqa_core::{Error, Result};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::device::select_device;
use crate::run_blocking;
use crate::pool::masked_mean_l2;
use crate::tokenize::{candle_err, tokenize_on_device};

const BGE_M3_DIM: usize = 1024;
const MAX_LEN: usize = 256;

/// BGE-M3 sentence embeddings computed in-process.
pub struct BgeM3Embedder {
    inner: Arc<BgeModel>,
    id: String,
}

struct BgeModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BgeM3Embedder {
    pub fn new(model_dir: &str) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(model_dir)?;
        info!(dir = %model_dir.display(), "loading BGE-M3");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Embedding(format!("failed to load tokenizer from {}: {e}", tokenizer_path.display())))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin")).map_err(candle_err)?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(candle_err)?;
        info!("BGE-M3 model loaded");
        Ok(Self {
            inner: Arc::new(BgeModel { model, tokenizer, device }),
            id: format!("bge-m3:d{BGE_M3_DIM}"),
        })
    }

    /// Embed one text on the calling thread.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_text(text)
    }
}

impl BgeModel {
    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device).map_err(candle_err)?;
        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)
            .map_err(candle_err)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb: Vec<f32> = pooled
            .to_device(&Device::Cpu)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1())
            .map_err(candle_err)?;
        if emb.len() != BGE_M3_DIM {
            return Err(Error::Embedding(format!("expected {BGE_M3_DIM} dims, got {}", emb.len())));
        }
        if start.elapsed().as_millis() > 100 {
            warn!(elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding");
        }
        Ok(emb)
    }
}

#[async_trait]
impl Embedder for BgeM3Embedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        BGE_M3_DIM
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = self.inner.clone();
        let texts = texts.to_vec();
        run_blocking(move || texts.iter().map(|t| inner.embed_text(t)).collect()).await
    }
}

fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                info!(dir = %p.display(), "using {var}");
                return Ok(p);
            }
        }
    }
    let p = localqa_core::config::expand_path(configured);
    if p.exists() {
        return Ok(p);
    }
    let legacy = Path::new("../models/bge-m3");
    if legacy.exists() {
        return Ok(legacy.to_path_buf());
    }
    Err(Error::NotFound(format!("BGE-M3 model directory ({configured})")))
}
