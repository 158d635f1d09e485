// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX embedding provider (all-MiniLM-L6-v2 by default).
//!
//! Runs single-threaded CPU inference with attention-masked mean pooling and
//! L2 normalization, so cosine similarity reduces to a dot product.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use recall_config::model::EmbeddingConfig;
use recall_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, PluginAdapter,
    RecallError,
};
use tracing::debug;

use crate::model_manager::{ModelManager, TOKENIZER_FILE};

/// Sequence length the model was trained with.
const MAX_SEQ_TOKENS: usize = 256;

fn onnx_err(context: &str, e: impl std::fmt::Display) -> RecallError {
    RecallError::provider(format!("{context}: {e}"))
}

/// Sentence embedder backed by an ONNX Runtime session.
pub struct OnnxEmbedder {
    /// ONNX Runtime session (not Send, wrapped in Mutex).
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    dimensions: usize,
    max_input_chars: usize,
}

// Safety: the session is only reached through the Mutex; tokenizer encoding
// takes &self and holds no interior state.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Load the model at `model_path`; `tokenizer.json` must sit beside it.
    pub fn new(
        model_path: &Path,
        dimensions: usize,
        max_input_chars: usize,
    ) -> Result<Self, RecallError> {
        let model_dir = model_path
            .parent()
            .ok_or_else(|| RecallError::provider("invalid model path"))?;

        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            onnx_err(
                &format!("failed to load tokenizer from {}", tokenizer_path.display()),
                e,
            )
        })?;

        let session = Session::builder()
            .map_err(|e| onnx_err("failed to create ONNX session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| onnx_err("failed to set optimization level", e))?
            .with_intra_threads(1)
            .map_err(|e| onnx_err("failed to set thread count", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                onnx_err(
                    &format!("failed to load ONNX model from {}", model_path.display()),
                    e,
                )
            })?;

        debug!(model = %model_path.display(), dimensions, "onnx embedder loaded");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
            max_input_chars,
        })
    }

    /// Download the configured model if needed, then load it.
    pub async fn from_manager(
        manager: &ModelManager,
        config: &EmbeddingConfig,
    ) -> Result<Self, RecallError> {
        let model_path = manager.ensure_model().await?;
        Self::new(&model_path, config.dimensions, config.max_input_chars)
    }

    /// Embed one text into a unit-length vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| onnx_err("tokenization failed", e))?;

        let seq_len = encoding.get_ids().len().min(MAX_SEQ_TOKENS);
        let input_ids: Vec<i64> = encoding.get_ids()[..seq_len]
            .iter()
            .map(|&id| id as i64)
            .collect();
        let attention_mask: Vec<i64> = encoding.get_attention_mask()[..seq_len]
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids()[..seq_len]
            .iter()
            .map(|&t| t as i64)
            .collect();

        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| onnx_err("failed to shape input_ids", e))?;
        let attention_mask_array = Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| onnx_err("failed to shape attention_mask", e))?;
        let token_type_ids_array = Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| onnx_err("failed to shape token_type_ids", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| onnx_err("ONNX session lock poisoned", e))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(&input_ids_array)
                    .map_err(|e| onnx_err("bad input_ids tensor", e))?,
                "attention_mask" => TensorRef::from_array_view(&attention_mask_array)
                    .map_err(|e| onnx_err("bad attention_mask tensor", e))?,
                "token_type_ids" => TensorRef::from_array_view(&token_type_ids_array)
                    .map_err(|e| onnx_err("bad token_type_ids tensor", e))?
            ])
            .map_err(|e| onnx_err("ONNX inference failed", e))?;

        // [1, seq_len, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| onnx_err("failed to extract output tensor", e))?;
        let hidden_size = shape[shape.len() - 1] as usize;
        if hidden_size != self.dimensions {
            return Err(RecallError::DimensionMismatch {
                expected: self.dimensions,
                actual: hidden_size,
            });
        }

        let pooled = mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size);
        Ok(l2_normalize(&pooled))
    }
}

/// Average token vectors whose attention mask is set.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (i, &mask) in attention_mask.iter().enumerate().take(seq_len) {
        if mask > 0 {
            let row = &embeddings[i * hidden_size..(i + 1) * hidden_size];
            for (acc, v) in sum.iter_mut().zip(row) {
                *acc += v;
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }
    sum
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        match self.session.lock() {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("session lock poisoned: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        let embeddings = input
            .texts
            .iter()
            .map(|text| self.embed_text(text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }
}
