use std::cmp::Ordering;

use time::OffsetDateTime;

/// Cosine similarity (`1 - cosine distance`) between two vectors of the same
/// dimensionality. `None` on a dimension mismatch; a zero-magnitude vector
/// yields 0.0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.len() != b.len() || a.is_empty() {
		return None;
	}

	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b.iter()) {
		dot += f64::from(*x) * f64::from(*y);
		norm_a += f64::from(*x) * f64::from(*x);
		norm_b += f64::from(*y) * f64::from(*y);
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return Some(0.0);
	}

	Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// Sort key for retrieved examples: similarity descending, then quality
/// score descending, then most recent creation time.
#[derive(Clone, Copy, Debug)]
pub struct RankingKey {
	pub similarity: f32,
	pub quality_score: f32,
	pub created_at: OffsetDateTime,
}

pub fn compare_ranked(a: &RankingKey, b: &RankingKey) -> Ordering {
	b.similarity
		.total_cmp(&a.similarity)
		.then_with(|| b.quality_score.total_cmp(&a.quality_score))
		.then_with(|| b.created_at.cmp(&a.created_at))
}
