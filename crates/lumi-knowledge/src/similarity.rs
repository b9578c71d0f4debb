//! Cosine similarity.

use lumi_core::types::Faq;

/// Dot product over the product of magnitudes.
///
/// Returns 0.0 for empty input, mismatched lengths, or a zero-magnitude
/// vector. Never NaN for finite input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0)
    }
}

pub trait Similarity {
    /// Similarity to a query vector; 0.0 when there is nothing to compare.
    fn similarity_to(&self, query: &[f32]) -> f32;
}

impl Similarity for Faq {
    fn similarity_to(&self, query: &[f32]) -> f32 {
        match &self.embedding {
            Some(e) => cosine_similarity(e.as_slice(), query),
            None => 0.0,
        }
    }
}
