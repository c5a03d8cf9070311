//! Dense sentence-embedding vectorizer.
//!
//! Each chunk is encoded once into a fixed-dimensionality vector by a
//! [`SentenceEncoder`]. Queries go through the same encoder, so both sides
//! live in the same space.

use std::sync::Arc;

use anyhow::{bail, Result};

use super::{cosine_similarity, QueryVector, Vectorizer};

/// A pretrained text encoder producing one vector per input text.
///
/// Encoding is synchronous and CPU-bound; async callers should wrap corpus
/// encoding in `tokio::task::spawn_blocking`.
pub trait SentenceEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct DenseVectorizer {
    encoder: Arc<dyn SentenceEncoder>,
    matrix: Vec<Vec<f32>>,
}

impl DenseVectorizer {
    /// Encode `texts` into the corpus matrix, one row per text.
    pub fn fit(encoder: Arc<dyn SentenceEncoder>, texts: &[String]) -> Result<Self> {
        let matrix = if texts.is_empty() {
            Vec::new()
        } else {
            encoder.encode(texts)?
        };
        if matrix.len() != texts.len() {
            bail!(
                "encoder {} returned {} vectors for {} texts",
                encoder.model_name(),
                matrix.len(),
                texts.len()
            );
        }
        Ok(Self { encoder, matrix })
    }
}

impl Vectorizer for DenseVectorizer {
    fn kind(&self) -> &'static str {
        "dense"
    }

    fn rows(&self) -> usize {
        self.matrix.len()
    }

    fn embed_query(&self, text: &str) -> Result<QueryVector> {
        let mut vectors = self.encoder.encode(&[text.to_string()])?;
        match vectors.pop() {
            Some(v) => Ok(QueryVector::Dense(v)),
            None => bail!("Empty embedding response"),
        }
    }

    fn similarities(&self, query: &QueryVector) -> Vec<f32> {
        match query {
            QueryVector::Dense(q) => self
                .matrix
                .iter()
                .map(|row| cosine_similarity(q, row))
                .collect(),
            QueryVector::Sparse(_) => vec![0.0; self.matrix.len()],
        }
    }
}

// ============ fastembed ============

/// Sentence encoder running a local ONNX model through fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached;
/// afterwards encoding runs entirely offline.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct FastembedEncoder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl FastembedEncoder {
    /// Load the model. Blocking: downloads weights on first use.
    pub fn new(config: &crate::config::EmbeddingConfig) -> Result<Self> {
        let (model, dims) = config_to_fastembed_model(&config.model)?;
        let embedding = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name: config.model.clone(),
            dims,
            batch_size: config.batch_size,
            model: std::sync::Mutex::new(embedding),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
impl SentenceEncoder for FastembedEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
        model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((fastembed::EmbeddingModel::NomicEmbedTextV15, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

/// Create the production sentence encoder.
#[cfg(feature = "local-embeddings-fastembed")]
pub fn create_encoder(config: &crate::config::EmbeddingConfig) -> Result<Arc<dyn SentenceEncoder>> {
    Ok(Arc::new(FastembedEncoder::new(config)?))
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
pub fn create_encoder(
    _config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn SentenceEncoder>> {
    bail!("The dense vectorizer requires --features local-embeddings-fastembed")
}
