//! # Context Retriever
//!
//! Narrows a large reference document to the passages most relevant to a
//! requested feature.
//!
//! ## Core Concepts
//! - **Windows**: overlapping slices of the document (see [`splitter`])
//! - **Embedder**: pluggable text → vector service (remote or TF-IDF)
//! - **Query**: the k windows nearest to the feature text, closest first

pub mod embedding;
pub mod remote;
pub mod splitter;
pub mod tfidf;

pub use embedding::{Embedder, Embedding};
pub use remote::{EmbeddingConfig, RemoteEmbedder};
pub use splitter::{SplitterConfig, TextSplitter};
pub use tfidf::TfIdfEmbedder;

use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};

/// Passages retrieved per query unless configured otherwise
pub const DEFAULT_TOP_K: usize = 3;

/// One retrieved window of the reference document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Position of the window in document order
    pub window: usize,
    /// Squared distance to the query embedding
    pub distance: f32,
    pub text: String,
}

/// The passages selected for one feature, closest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub passages: Vec<Passage>,
}

impl RetrievedContext {
    /// Passage texts joined by newlines, the form inserted into prompts
    pub fn joined(&self) -> String {
        self.passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// An embedded reference document, ready for nearest-neighbour queries.
///
/// The index owns its embedder: a fitted embedder (TF-IDF) is only
/// meaningful for the corpus it was fitted on.
pub struct ContextIndex<E: Embedder> {
    embedder: E,
    windows: Vec<String>,
    vectors: Vec<Embedding>,
}

impl<E: Embedder> ContextIndex<E> {
    /// Split `document` into windows and embed each one.
    ///
    /// Fails with `RetrievalUnavailable` when the document is blank or the
    /// embedder cannot be reached.
    pub async fn build(document: &str, splitter: &TextSplitter, embedder: E) -> Result<Self> {
        if document.trim().is_empty() {
            return Err(error::empty_document());
        }

        let windows = splitter.split(document);
        if windows.is_empty() {
            return Err(error::empty_document());
        }

        let vectors = embedder
            .embed_documents(&windows)
            .await
            .map_err(|e| e.with_operation("retriever::build"))?;
        if vectors.len() != windows.len() {
            return Err(error::embedding_failed(format!(
                "embedder returned {} vectors for {} windows",
                vectors.len(),
                windows.len()
            ))
            .with_operation("retriever::build"));
        }

        info!(
            windows = windows.len(),
            embedder = embedder.name(),
            "indexed reference document"
        );

        Ok(Self {
            embedder,
            windows,
            vectors,
        })
    }

    /// Read a reference document from disk and index it
    pub async fn from_file(path: impl AsRef<Path>, splitter: &TextSplitter, embedder: E) -> Result<Self> {
        let path = path.as_ref();
        let document = tokio::fs::read_to_string(path).await.map_err(|e| {
            error::io_error(path, e)
                .with_operation("retriever::from_file")
        })?;
        Self::build(&document, splitter, embedder).await
    }

    /// The `k` windows closest to `text`, by increasing distance.
    ///
    /// Equal distances keep document order. Asking for more windows than
    /// exist returns all of them.
    pub async fn query(&self, text: &str, k: usize) -> Result<RetrievedContext> {
        if self.windows.is_empty() {
            return Err(error::empty_index());
        }

        let query = self
            .embedder
            .embed_query(text)
            .await
            .map_err(|e| e.with_operation("retriever::query"))?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, embedding::squared_distance(&query, v)))
            .collect();

        if scored.iter().all(|(_, d)| d.is_infinite()) {
            return Err(error::embedding_failed("query embedding has the wrong dimension")
                .with_operation("retriever::query"));
        }

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        debug!(k, returned = scored.len(), "retrieved context");

        Ok(RetrievedContext {
            passages: scored
                .into_iter()
                .map(|(window, distance)| Passage {
                    window,
                    distance,
                    text: self.windows[window].clone(),
                })
                .collect(),
        })
    }

    /// Number of windows in the index
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn windows(&self) -> &[String] {
        &self.windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const PARALLEL_SECTION: &str = "2.5.1 Parallel Construct. The parallel construct launches \
        gangs of workers on the accelerator. Each gang begins executing the structured block \
        in gang-redundant mode, and the number of gangs and workers stays fixed for the \
        duration of the parallel region.";

    const DATA_SECTION: &str = "2.6.5 Data Construct. The data construct defines scalars, \
        arrays and subarrays to be allocated in device memory for the duration of the \
        region. The copyin and copyout clauses control whether data moves between host \
        memory and device memory on entry and exit.";

    fn document() -> String {
        format!("{}\n\n{}", PARALLEL_SECTION, DATA_SECTION)
    }

    fn splitter() -> TextSplitter {
        TextSplitter::new(SplitterConfig::default()).unwrap()
    }

    /// Embeds with fixed vectors so distances are predictable
    struct FixedEmbedder {
        documents: Vec<Embedding>,
        query: Embedding,
    }

    impl Embedder for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(self.documents.iter().take(texts.len()).cloned().collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Embedding> {
            Ok(self.query.clone())
        }
    }

    #[tokio::test]
    async fn test_topical_query_ranks_matching_section_first() {
        let index = ContextIndex::build(&document(), &splitter(), TfIdfEmbedder::new())
            .await
            .unwrap();
        assert_eq!(index.len(), 2);

        let context = index
            .query("data construct copyin clause device memory", 3)
            .await
            .unwrap();
        assert_eq!(context.len(), 2);
        assert!(context.passages[0].text.starts_with("2.6.5 Data Construct"));
        assert!(context.passages[0].distance <= context.passages[1].distance);

        let context = index.query("parallel construct gangs", 1).await.unwrap();
        assert_eq!(context.len(), 1);
        assert!(context.passages[0].text.starts_with("2.5.1 Parallel Construct"));
    }

    #[tokio::test]
    async fn test_results_ordered_by_increasing_distance() {
        let text = "first window\n\nsecond window\n\nthird window";
        let splitter = TextSplitter::new(SplitterConfig { chunk_size: 14, chunk_overlap: 0 }).unwrap();
        let embedder = FixedEmbedder {
            documents: vec![vec![5.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]],
            query: vec![0.0, 0.0],
        };
        let index = ContextIndex::build(text, &splitter, embedder).await.unwrap();
        assert_eq!(index.len(), 3);

        let context = index.query("anything", 3).await.unwrap();
        let order: Vec<usize> = context.passages.iter().map(|p| p.window).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(context.joined(), "second window\nthird window\nfirst window");
    }

    #[tokio::test]
    async fn test_ties_keep_document_order() {
        let text = "alpha window\n\nbravo window";
        let splitter = TextSplitter::new(SplitterConfig { chunk_size: 14, chunk_overlap: 0 }).unwrap();
        let embedder = FixedEmbedder {
            documents: vec![vec![1.0], vec![1.0]],
            query: vec![0.0],
        };
        let index = ContextIndex::build(text, &splitter, embedder).await.unwrap();
        let context = index.query("q", 2).await.unwrap();
        assert_eq!(context.passages[0].window, 0);
        assert_eq!(context.passages[1].window, 1);
    }

    #[tokio::test]
    async fn test_empty_document_is_retrieval_unavailable() {
        let err = ContextIndex::build("  \n ", &splitter(), TfIdfEmbedder::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RetrievalUnavailable);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_document_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContextIndex::from_file(dir.path().join("spec.txt"), &splitter(), TfIdfEmbedder::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[tokio::test]
    async fn test_wrong_vector_count_is_rejected() {
        let embedder = FixedEmbedder {
            documents: vec![],
            query: vec![0.0],
        };
        let err = ContextIndex::build("some text", &splitter(), embedder)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RetrievalUnavailable);
    }
}
