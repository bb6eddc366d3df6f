//! TF-IDF embedder — local, deterministic, no service required.
//!
//! Tokenizes text, builds IDF weights from the document windows handed to
//! `embed_documents`, and produces TF-IDF vectors normalized to unit length.
//! Queries are embedded against that fitted vocabulary.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::embedding::{normalize, Embedder, Embedding};
use crate::error::{self, Result};

/// Common English words that carry no topical signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "shall", "not", "no",
    "but", "if", "at", "by", "from", "as", "into", "about", "up", "out", "so", "its", "you",
    "your", "i", "my", "we", "our", "they", "them", "their", "he", "she", "his", "her",
];

#[derive(Debug, Clone)]
struct Vocabulary {
    /// term → dimension index
    terms: HashMap<String, usize>,
    /// IDF weight per dimension
    idf: Vec<f32>,
}

impl Vocabulary {
    fn fit(documents: &[String]) -> Self {
        let n = documents.len() as f32;
        let mut terms: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let tokens = tokenize(doc);
            let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
            for term in unique {
                *doc_freq.entry(term.to_string()).or_insert(0) += 1;
                if !terms.contains_key(term) {
                    let idx = terms.len();
                    terms.insert(term.to_string(), idx);
                }
            }
        }

        let mut idf = vec![0.0f32; terms.len()];
        for (term, &idx) in &terms {
            let df = *doc_freq.get(term).unwrap_or(&0) as f32;
            idf[idx] = (n / df.max(1.0)).ln() + 1.0;
        }

        Self { terms, idf }
    }

    fn embed(&self, text: &str) -> Embedding {
        let mut tf: HashMap<String, f32> = HashMap::new();
        for token in tokenize(text) {
            *tf.entry(token).or_insert(0.0) += 1.0;
        }

        let mut vector = vec![0.0f32; self.idf.len()];
        for (term, count) in &tf {
            if let Some(&idx) = self.terms.get(term) {
                vector[idx] = count * self.idf[idx];
            }
        }

        normalize(&mut vector);
        vector
    }
}

/// TF-IDF embedder; fitted by the first `embed_documents` call.
#[derive(Debug, Default)]
pub struct TfIdfEmbedder {
    vocabulary: RwLock<Option<Vocabulary>>,
}

impl TfIdfEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vocabulary size, zero before fitting
    pub fn dimensions(&self) -> usize {
        self.vocabulary
            .read()
            .ok()
            .and_then(|v| v.as_ref().map(|v| v.idf.len()))
            .unwrap_or(0)
    }
}

impl Embedder for TfIdfEmbedder {
    fn name(&self) -> &str {
        "tfidf"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let vocabulary = Vocabulary::fit(texts);
        let vectors = texts.iter().map(|t| vocabulary.embed(t)).collect();

        let mut slot = self
            .vocabulary
            .write()
            .map_err(|_| error::embedding_failed("tf-idf vocabulary lock poisoned"))?;
        *slot = Some(vocabulary);
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let slot = self
            .vocabulary
            .read()
            .map_err(|_| error::embedding_failed("tf-idf vocabulary lock poisoned"))?;
        match slot.as_ref() {
            Some(vocabulary) => Ok(vocabulary.embed(text)),
            None => Err(error::embedding_failed("tf-idf embedder queried before indexing")),
        }
    }
}

/// Tokenize text: lowercase, split on non-alphanumeric, filter stop words.
///
/// Underscores stay inside tokens so clause names like `num_gangs` survive.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.len() > 1)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}
