//! Similarity computation functions for embedding vectors

use ragweave_kernel::rag::SimilarityMetric;

/// Relevance score between two embeddings under the given metric.
///
/// Cosine similarity is mapped from [-1, 1] to [0, 1] so that scores from
/// every cosine store share one scale. Euclidean distance becomes
/// `1 / (1 + distance)`. Dot product is returned as is.
pub fn relevance_score(a: &[f32], b: &[f32], metric: SimilarityMetric) -> f64 {
    match metric {
        SimilarityMetric::Cosine => relevance_from_cosine(cosine_similarity(a, b)),
        SimilarityMetric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
        SimilarityMetric::DotProduct => dot_product(a, b),
    }
}

/// Maps a cosine similarity in [-1, 1] to a relevance score in [0, 1].
pub fn relevance_from_cosine(cosine: f64) -> f64 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot = dot_product(a, b);
    let norm_a = norm(a);
    let norm_b = norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Scales a vector to unit length in place. Zero vectors are left alone.
pub fn normalize(v: &mut [f32]) {
    let n = norm(v) as f32;
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}
