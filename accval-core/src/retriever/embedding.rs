//! Embedding service interface and distance helpers.

use crate::error::Result;

/// A single embedding vector.
pub type Embedding = Vec<f32>;

/// Turns text into vectors.
///
/// Implementations see the whole corpus once, at index-build time, through
/// [`Embedder::embed_documents`], and each query afterwards through
/// [`Embedder::embed_query`]. Any failure must surface as
/// `RetrievalUnavailable`.
#[allow(async_fn_in_trait)]
pub trait Embedder: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Embed the document windows, in order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a query against the space fixed by `embed_documents`
    async fn embed_query(&self, text: &str) -> Result<Embedding>;
}

/// Squared Euclidean distance. Mismatched lengths compare as infinitely far.
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Normalize a vector to unit length (in-place).
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
