//! Sparse TF-IDF vectorizer.
//!
//! Tokens are lowercased runs of two or more alphanumeric (or `_`)
//! characters. Weights are raw term counts times a smoothed inverse document
//! frequency, `ln((1 + n) / (1 + df)) + 1`, and every row is L2-normalised,
//! so cosine similarity reduces to a sparse dot product.
//!
//! The vocabulary and idf table are fixed by [`TfidfVectorizer::fit`]; queries
//! are only ever transformed against them.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use super::{cosine_similarity_sparse, QueryVector, SparseVector, Vectorizer};

pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    rows: Vec<SparseVector>,
}

impl TfidfVectorizer {
    /// Fit the vocabulary and idf weights on `texts` and transform them.
    pub fn fit(texts: &[String]) -> Self {
        let tokenized: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();

        // Sorted vocabulary keeps term ids stable across runs.
        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let n = texts.len() as f32;
        let mut vocabulary = HashMap::with_capacity(doc_freq.len());
        let mut idf = Vec::with_capacity(doc_freq.len());
        for (term_id, (term, df)) in doc_freq.into_iter().enumerate() {
            vocabulary.insert(term.to_string(), term_id);
            idf.push(((1.0 + n) / (1.0 + df as f32)).ln() + 1.0);
        }

        let mut vectorizer = Self {
            vocabulary,
            idf,
            rows: Vec::new(),
        };
        let rows = tokenized
            .iter()
            .map(|tokens| vectorizer.weigh(tokens))
            .collect();
        vectorizer.rows = rows;
        vectorizer
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn weigh(&self, tokens: &[String]) -> SparseVector {
        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(&term_id) = self.vocabulary.get(token) {
                *counts.entry(term_id).or_insert(0.0) += 1.0;
            }
        }
        let mut entries: Vec<(usize, f32)> = counts
            .into_iter()
            .map(|(term_id, count)| (term_id, count * self.idf[term_id]))
            .collect();

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for (_, w) in &mut entries {
                *w /= norm;
            }
        }
        SparseVector { entries }
    }
}

impl Vectorizer for TfidfVectorizer {
    fn kind(&self) -> &'static str {
        "tfidf"
    }

    fn rows(&self) -> usize {
        self.rows.len()
    }

    fn embed_query(&self, text: &str) -> Result<QueryVector> {
        Ok(QueryVector::Sparse(self.weigh(&tokenize(text))))
    }

    fn similarities(&self, query: &QueryVector) -> Vec<f32> {
        match query {
            QueryVector::Sparse(q) => self
                .rows
                .iter()
                .map(|row| cosine_similarity_sparse(q, row))
                .collect(),
            QueryVector::Dense(_) => vec![0.0; self.rows.len()],
        }
    }
}

/// Lowercased alphanumeric tokens of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(|token| token.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "The slate roof was replaced after the storm.".to_string(),
            "The kitchen extension added a larder and a pantry.".to_string(),
            "Solar panels on the south facing roof.".to_string(),
        ]
    }

    #[test]
    fn tokenize_drops_single_chars_and_punctuation() {
        assert_eq!(
            tokenize("A roof, a RAFTER & 2 x4s!"),
            vec!["roof", "rafter", "x4s"]
        );
    }

    #[test]
    fn rows_are_unit_length() {
        let v = TfidfVectorizer::fit(&corpus());
        assert_eq!(v.rows(), 3);
        for row in &v.rows {
            let norm: f32 = row.entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn query_matches_most_relevant_row() {
        let v = TfidfVectorizer::fit(&corpus());
        let q = v.embed_query("what happened to the pantry?").unwrap();
        let sims = v.similarities(&q);
        assert!(sims[1] > sims[0]);
        assert!(sims[1] > sims[2]);
    }

    #[test]
    fn unknown_terms_score_zero() {
        let v = TfidfVectorizer::fit(&corpus());
        let q = v.embed_query("zeppelin aquarium").unwrap();
        assert!(v.similarities(&q).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn embedding_query_does_not_change_vocabulary() {
        let v = TfidfVectorizer::fit(&corpus());
        let size = v.vocabulary_size();
        let first = v.embed_query("roof storm zeppelin").unwrap();
        let second = v.embed_query("roof storm zeppelin").unwrap();
        assert_eq!(v.vocabulary_size(), size);
        assert_eq!(first, second);
    }

    #[test]
    fn smoothed_idf_weights_rare_terms_higher() {
        let v = TfidfVectorizer::fit(&corpus());
        let the = v.vocabulary["the"];
        let pantry = v.vocabulary["pantry"];
        assert!(v.idf[pantry] > v.idf[the]);
        // "the" appears in every document: ln(4/4) + 1
        assert!((v.idf[the] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_corpus_fits() {
        let v = TfidfVectorizer::fit(&[]);
        assert_eq!(v.rows(), 0);
        let q = v.embed_query("anything").unwrap();
        assert!(v.similarities(&q).is_empty());
    }
}
