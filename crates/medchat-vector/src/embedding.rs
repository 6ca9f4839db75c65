//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` runs a sentence-transformer ONNX export (e.g.
//!   all-MiniLM-L6-v2) through ort, tokenizing with the HuggingFace
//!   tokenizers crate. This is the production backend for term and message
//!   vectors.
//! - `MockEmbedding` returns deterministic hash-based vectors. Identical
//!   texts score 1.0 against each other; unrelated texts score near 0.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use medchat_core::error::MedchatError;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::Tokenizer;
use tracing::info;

use crate::similarity::l2_normalize;

/// Fallback width when the model does not declare its hidden size.
const DEFAULT_DIMENSIONS: usize = 384;

/// Service for generating text embeddings.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, MedchatError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe counterpart of [`EmbeddingService`].
///
/// The classifier and corpus hold `Arc<dyn DynEmbeddingService>` so the
/// backend can be chosen from configuration at startup. Every
/// `EmbeddingService` implements it through the blanket impl below.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, MedchatError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, MedchatError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed sentence embedder.
///
/// The model directory must contain `model.onnx` and `tokenizer.json`. The
/// model takes `input_ids`, `attention_mask` and `token_type_ids` and
/// returns token embeddings; the service mean-pools them under the
/// attention mask and L2-normalizes the result.
#[derive(Clone)]
pub struct OnnxEmbeddingService {
    inner: Arc<OnnxModel>,
}

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
}

// Session is shareable across threads; access is serialized by the mutex.
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.inner.dimensions)
            .finish()
    }
}

impl OnnxEmbeddingService {
    /// Load a sentence-transformer model from a directory.
    pub fn from_directory(model_dir: &Path) -> Result<Self, MedchatError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
        )
    }

    /// Load from explicit model and tokenizer file paths.
    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, MedchatError> {
        for (what, path) in [("ONNX model", model_path), ("Tokenizer", tokenizer_path)] {
            if !path.exists() {
                return Err(MedchatError::Embedding(format!(
                    "{} not found at {}",
                    what,
                    path.display()
                )));
            }
        }

        let session = Session::builder()
            .map_err(|e| MedchatError::Embedding(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| MedchatError::Embedding(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| MedchatError::Embedding(format!("ONNX load model: {}", e)))?;

        // Output is [batch, seq_len, hidden]; the last axis is the width.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .filter(|d| *d > 0)
            .map(|d| d as usize)
            .unwrap_or(DEFAULT_DIMENSIONS);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| MedchatError::Embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            model = %model_path.display(),
            dimensions,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            inner: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                dimensions,
            }),
        })
    }
}

impl OnnxModel {
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, MedchatError> {
        if text.is_empty() {
            return Err(MedchatError::Embedding("Cannot embed empty text".to_string()));
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| MedchatError::Embedding(format!("Tokenization failed: {}", e)))?;

        let to_i64 = |xs: &[u32]| xs.iter().map(|&x| x as i64).collect::<Vec<i64>>();
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let token_type_ids = to_i64(encoding.get_type_ids());
        let seq_len = input_ids.len();

        let as_batch = |name: &str, values: Vec<i64>| {
            ndarray::Array2::from_shape_vec((1, seq_len), values)
                .map_err(|e| MedchatError::Embedding(format!("{} array: {}", name, e)))
        };
        let ids = as_batch("input_ids", input_ids)?;
        let mask = as_batch("attention_mask", attention_mask.clone())?;
        let types = as_batch("token_type_ids", token_type_ids)?;

        let ids_ref = TensorRef::from_array_view(&ids).map_err(tensor_err)?;
        let mask_ref = TensorRef::from_array_view(&mask).map_err(tensor_err)?;
        let types_ref = TensorRef::from_array_view(&types).map_err(tensor_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| MedchatError::Embedding(format!("Session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![ids_ref, mask_ref, types_ref])
            .map_err(|e| MedchatError::Embedding(format!("ONNX inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MedchatError::Embedding(format!("Extract embeddings: {}", e)))?;

        let hidden = match shape.iter().last() {
            Some(&d) if shape.len() >= 2 && d > 0 => d as usize,
            _ => {
                return Err(MedchatError::Embedding(format!(
                    "Unexpected output shape: {:?}",
                    shape.iter().collect::<Vec<_>>()
                )))
            }
        };

        Ok(mean_pool(data, &attention_mask, hidden))
    }
}

fn tensor_err(e: impl std::fmt::Display) -> MedchatError {
    MedchatError::Embedding(format!("Tensor view: {}", e))
}

/// Average token vectors whose mask is set, then L2-normalize.
fn mean_pool(tokens: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden];
    let mut count = 0usize;

    for (idx, _) in mask.iter().enumerate().filter(|(_, m)| **m > 0) {
        let Some(row) = tokens.get(idx * hidden..(idx + 1) * hidden) else {
            break;
        };
        for (acc, v) in pooled.iter_mut().zip(row) {
            *acc += v;
        }
        count += 1;
    }

    if count > 0 {
        let n = count as f32;
        pooled.iter_mut().for_each(|v| *v /= n);
    }
    l2_normalize(&mut pooled);
    pooled
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MedchatError> {
        // Inference is CPU-bound; keep it off the async workers.
        let model = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed_sync(&text))
            .await
            .map_err(|e| MedchatError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding
// ---------------------------------------------------------------------------

/// Deterministic hash-based embedder for development and tests.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result: Vec<f32> = (0..DEFAULT_DIMENSIONS)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let h = hasher.finish();
                (((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0) as f32
            })
            .collect();
        l2_normalize(&mut result);
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MedchatError> {
        if text.is_empty() {
            return Err(MedchatError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }
}
