//! Embedding capability used to index sections and queries.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider, EmbeddingSignature};

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
