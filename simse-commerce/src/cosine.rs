/// Compute cosine similarity between two vectors.
/// Returns 0.0 for zero-magnitude vectors or dimension mismatches.
/// Result clamped to [-1.0, 1.0].
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
	cosine_similarity_with_magnitude(a, b, compute_magnitude(a), compute_magnitude(b))
}

/// Compute the magnitude (L2 norm) of a vector.
pub fn compute_magnitude(vector: &[f64]) -> f64 {
	vector.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Compute cosine similarity using pre-computed magnitudes.
/// Falls back to returning 0.0 if either magnitude is zero.
pub fn cosine_similarity_with_magnitude(a: &[f64], b: &[f64], mag_a: f64, mag_b: f64) -> f64 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let denom = mag_a * mag_b;
	if denom == 0.0 {
		return 0.0;
	}

	let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();

	let result = dot / denom;
	if !result.is_finite() {
		return 0.0;
	}
	result.clamp(-1.0, 1.0)
}
