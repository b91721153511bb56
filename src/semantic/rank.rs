//! Cosine similarity ranking.
//!
//! Scores are compared only within one candidate set. The sort is stable:
//! equal scores keep the order in which the candidates were passed in.

use serde::Serialize;
use std::cmp::Ordering;

use crate::recipes::RecipeId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredRecipe {
    pub id: RecipeId,
    /// Cosine similarity in [-1.0, 1.0]
    pub score: f32,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; 0.0 when either side is a zero vector or the
/// lengths differ. Never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    similarity_with_norm(a, l2_norm(a), b)
}

fn similarity_with_norm(query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
    let target_norm = l2_norm(target);
    if query_norm < f32::EPSILON || target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    let score = (dot_product / (query_norm * target_norm)).clamp(-1.0, 1.0);
    if score.is_finite() {
        // fold -0.0 into 0.0 so equal scores compare equal
        score + 0.0
    } else {
        0.0
    }
}

/// Rank `candidates` against `query`, highest score first, at most `top_k`.
pub fn rank(query: &[f32], candidates: &[(RecipeId, &[f32])], top_k: usize) -> Vec<ScoredRecipe> {
    if top_k == 0 || candidates.is_empty() {
        return vec![];
    }

    let query_norm = l2_norm(query);
    let mut results: Vec<ScoredRecipe> = candidates
        .iter()
        .map(|(id, embedding)| ScoredRecipe {
            id: *id,
            score: if embedding.len() == query.len() {
                similarity_with_norm(query, query_norm, embedding)
            } else {
                0.0
            },
        })
        .collect();

    // stable: ties stay in candidate order
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(top_k);
    results
}
