//! Similarity scoring and ranking of retrieval candidates.

use tessera_core::{Candidate, ScoredCandidate, WebCandidate};

/// Cosine similarity of two vectors.
///
/// Defined as `0.0` when either vector has zero magnitude or the lengths differ.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::rank::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
/// assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Raw dot product, for collections using the dot metric.
pub fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Score, order, filter, and truncate candidates.
///
/// Candidates with a precomputed score keep it; the rest are scored by cosine
/// similarity against `query`. A candidate with neither scores `0.0`.
/// Sorting is stable, so ties keep their input order. Only candidates scoring
/// strictly above `threshold` survive, and at most `top_k` are returned.
///
/// # Examples
///
/// ```
/// use tessera_core::{Candidate, Payload};
/// use tessera_retrieval::rank::rank;
///
/// let hit = |text: &str, score: f64| Candidate {
///     payload: Payload { title: None, text: text.into() },
///     vector: None,
///     score: Some(score),
/// };
/// let ranked = rank(&[1.0], vec![hit("low", 0.2), hit("high", 0.9), hit("mid", 0.5)], 0.3, 5);
/// let texts: Vec<_> = ranked.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, vec!["high", "mid"]);
/// ```
pub fn rank(
    query: &[f32],
    candidates: Vec<Candidate>,
    threshold: f64,
    top_k: usize,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let score = match (candidate.score, &candidate.vector) {
                (Some(score), _) => score,
                (None, Some(vector)) => cosine_similarity(query, vector),
                (None, None) => 0.0,
            };
            ScoredCandidate {
                title: candidate.payload.title,
                text: candidate.payload.text,
                score,
            }
        })
        .collect();

    // `sort_by` is stable; NaN scores compare equal and are then filtered out.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.retain(|c| c.score > threshold);
    scored.truncate(top_k);
    scored
}

/// Index of the web candidate most similar to `query`.
///
/// Candidates without a vector are skipped. The earliest candidate wins ties.
/// Returns `None` when no candidate has a vector.
///
/// # Examples
///
/// ```
/// use tessera_core::WebCandidate;
/// use tessera_retrieval::rank::best_candidate;
///
/// let c = |title: &str, v: Vec<f32>| WebCandidate {
///     title: title.into(),
///     summary: String::new(),
///     vector: Some(v),
/// };
/// let candidates = vec![c("Lyon", vec![0.0, 1.0]), c("Paris", vec![1.0, 0.1])];
/// let (idx, score) = best_candidate(&[1.0, 0.0], &candidates).unwrap();
/// assert_eq!(candidates[idx].title, "Paris");
/// assert!(score > 0.9);
/// ```
pub fn best_candidate(query: &[f32], candidates: &[WebCandidate]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let Some(vector) = &candidate.vector else {
            continue;
        };
        let score = cosine_similarity(query, vector);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    best
}
