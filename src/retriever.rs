//! Nearest-chunk retrieval over a [`CorpusIndex`].

use anyhow::Result;
use std::cmp::Ordering;
use tracing::debug;

use crate::models::RetrievedChunk;
use crate::vectorize::CorpusIndex;

/// Return the `k` chunks most similar to `query`, best first.
///
/// The sort is stable, so equal scores keep corpus order. A corpus smaller
/// than `k` returns every chunk; an empty corpus returns an empty list.
pub fn top_k(index: &CorpusIndex, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
    if index.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let vectorizer = index.vectorizer();
    let query_vec = vectorizer.embed_query(query)?;
    let scores = vectorizer.similarities(&query_vec);

    let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(k);

    let hits: Vec<RetrievedChunk> = ranked
        .into_iter()
        .filter_map(|(position, score)| {
            index.chunks().get(position).map(|chunk| RetrievedChunk {
                corpus_position: position,
                chunk: chunk.clone(),
                score,
            })
        })
        .collect();

    debug!(
        vectorizer = vectorizer.kind(),
        hits = hits.len(),
        best = hits.first().map(|h| h.score).unwrap_or(0.0),
        "retrieved context"
    );
    Ok(hits)
}
