//! Corpus vectorization.
//!
//! Two interchangeable strategies sit behind the [`Vectorizer`] trait:
//!
//! | Strategy | Module | Representation |
//! |----------|--------|----------------|
//! | `tfidf` | [`tfidf`] | sparse `[N x V]`, L2-normalised rows |
//! | `dense` | [`dense`] | dense `[N x D]` sentence embeddings |
//!
//! A [`CorpusIndex`] pairs the chunk list with a fitted vectorizer, row `i`
//! describing chunk `i`. The index is built once per process through
//! [`IndexCache`] and shared read-only afterwards.

pub mod dense;
pub mod tfidf;

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::Config;
use crate::models::DocumentChunk;

use self::dense::{create_encoder, DenseVectorizer};
use self::tfidf::TfidfVectorizer;

/// A sparse vector as `(term id, weight)` pairs sorted by term id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseVector {
    pub entries: Vec<(usize, f32)>,
}

/// A query projected into a fitted vector space.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

/// A fitted corpus representation.
///
/// Implementations are fitted once at construction. `embed_query` only
/// transforms against the fitted space and must never change it.
pub trait Vectorizer: Send + Sync {
    /// Strategy name, as used in `[retrieval].vectorizer`.
    fn kind(&self) -> &'static str;

    /// Number of corpus rows.
    fn rows(&self) -> usize;

    fn embed_query(&self, text: &str) -> Result<QueryVector>;

    /// Cosine similarity of `query` against every row, in corpus order.
    fn similarities(&self, query: &QueryVector) -> Vec<f32>;
}

/// Cosine similarity of two dense vectors.
///
/// Returns `0.0` for mismatched lengths, empty input or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Cosine similarity of two sparse vectors with sorted term ids.
pub fn cosine_similarity_sparse(a: &SparseVector, b: &SparseVector) -> f32 {
    let norm_a = a.entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    let norm_b = b.entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        return 0.0;
    }

    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0f32;
    while i < a.entries.len() && j < b.entries.len() {
        let (ta, wa) = a.entries[i];
        let (tb, wb) = b.entries[j];
        match ta.cmp(&tb) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += wa * wb;
                i += 1;
                j += 1;
            }
        }
    }
    dot / denom
}

/// The chunk corpus paired with its fitted vector representation.
pub struct CorpusIndex {
    chunks: Vec<DocumentChunk>,
    vectorizer: Box<dyn Vectorizer>,
}

impl CorpusIndex {
    pub fn new(chunks: Vec<DocumentChunk>, vectorizer: Box<dyn Vectorizer>) -> Result<Self> {
        if vectorizer.rows() != chunks.len() {
            bail!(
                "{} vectorizer has {} rows for {} chunks",
                vectorizer.kind(),
                vectorizer.rows(),
                chunks.len()
            );
        }
        Ok(Self { chunks, vectorizer })
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn vectorizer(&self) -> &dyn Vectorizer {
        self.vectorizer.as_ref()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Fit the configured vectorizer over `chunks`.
///
/// Both strategies run on the blocking pool: TF-IDF fitting is CPU-bound and
/// dense encoding may also download model weights on first use.
pub async fn build_index(config: &Config, chunks: Vec<DocumentChunk>) -> Result<CorpusIndex> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    let vectorizer: Box<dyn Vectorizer> = match config.retrieval.vectorizer.as_str() {
        "tfidf" => {
            let fitted = tokio::task::spawn_blocking(move || TfidfVectorizer::fit(&texts)).await?;
            info!(vocabulary = fitted.vocabulary_size(), "tf-idf fitted");
            Box::new(fitted)
        }
        "dense" => {
            let embedding = config.embedding.clone();
            let fitted = tokio::task::spawn_blocking(move || -> Result<DenseVectorizer> {
                let encoder = create_encoder(&embedding)?;
                DenseVectorizer::fit(encoder, &texts)
            })
            .await??;
            info!(model = %config.embedding.model, "dense embeddings computed");
            Box::new(fitted)
        }
        other => bail!("Unknown vectorizer: '{}'. Must be tfidf or dense.", other),
    };

    CorpusIndex::new(chunks, vectorizer)
}

/// Process-lifetime holder for the corpus index.
///
/// The first call to [`IndexCache::get_or_build`] runs the build; every later
/// call returns the same `Arc` without rebuilding.
#[derive(Default)]
pub struct IndexCache {
    cell: OnceCell<Arc<CorpusIndex>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build<F, Fut>(&self, build: F) -> Result<Arc<CorpusIndex>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CorpusIndex>>,
    {
        let index = self
            .cell
            .get_or_try_init(move || async move { build().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
        texts
            .iter()
            .map(|t| DocumentChunk::new(*t, "notes.md"))
            .collect()
    }

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_sparse_cosine_matches_dense() {
        let a = SparseVector {
            entries: vec![(0, 1.0), (2, 2.0), (5, 1.0)],
        };
        let b = SparseVector {
            entries: vec![(2, 1.0), (3, 4.0), (5, 3.0)],
        };
        let dense_a = [1.0, 0.0, 2.0, 0.0, 0.0, 1.0];
        let dense_b = [0.0, 0.0, 1.0, 4.0, 0.0, 3.0];
        let expected = cosine_similarity(&dense_a, &dense_b);
        assert!((cosine_similarity_sparse(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_cosine_empty_is_zero() {
        let empty = SparseVector::default();
        let a = SparseVector {
            entries: vec![(1, 1.0)],
        };
        assert_eq!(cosine_similarity_sparse(&empty, &a), 0.0);
    }

    #[test]
    fn test_index_rejects_misaligned_rows() {
        let fitted = TfidfVectorizer::fit(&["one chunk".to_string()]);
        let result = CorpusIndex::new(chunks(&["one chunk", "two chunks"]), Box::new(fitted));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_index_tfidf() {
        let config = Config::default();
        let index = build_index(&config, chunks(&["slate roof", "oak floor"]))
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.vectorizer().kind(), "tfidf");
    }

    #[tokio::test]
    async fn test_build_index_empty_corpus() {
        let index = build_index(&Config::default(), Vec::new()).await.unwrap();
        assert!(index.is_empty());
        assert_eq!(index.vectorizer().rows(), 0);
    }

    #[tokio::test]
    async fn test_cache_builds_once() {
        let cache = IndexCache::new();
        let counter = AtomicUsize::new(0);
        let builds = &counter;

        for _ in 0..3 {
            let index = cache
                .get_or_build(move || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    let fitted = TfidfVectorizer::fit(&["attic".to_string()]);
                    CorpusIndex::new(chunks(&["attic"]), Box::new(fitted))
                })
                .await
                .unwrap();
            assert_eq!(index.len(), 1);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
