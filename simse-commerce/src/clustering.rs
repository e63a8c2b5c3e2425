// ---------------------------------------------------------------------------
// Customer segmentation — z-score normalization + k-means (Lloyd)
// ---------------------------------------------------------------------------
//
// 1. Normalize each feature column to zero mean / unit population stddev.
// 2. Seed k centroids with rows drawn uniformly at random.
// 3. Assign each row to its nearest centroid (squared Euclidean; ties go to
//    the lowest centroid index).
// 4. Move each centroid to the mean of its rows; empty clusters stay put.
// 5. Repeat 3–4 until an assignment pass changes nothing, or the iteration
//    cap is hit (logged, result still returned).
// ---------------------------------------------------------------------------

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::EngineError;
use crate::types::{CustomerFeatureRow, SegmentLabel};

pub const DEFAULT_CLUSTERS: usize = 4;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Replace every value with its column z-score. A constant column becomes 0.
pub fn normalize_features(rows: &mut [Vec<f64>]) {
	let Some(width) = rows.first().map(|r| r.len()) else {
		return;
	};
	let n = rows.len() as f64;

	let mut means = vec![0.0; width];
	for row in rows.iter() {
		for (m, v) in means.iter_mut().zip(row) {
			*m += v;
		}
	}
	for m in &mut means {
		*m /= n;
	}

	let mut stddevs = vec![0.0; width];
	for row in rows.iter() {
		for (i, v) in row.iter().enumerate() {
			stddevs[i] += (v - means[i]).powi(2);
		}
	}
	for s in &mut stddevs {
		*s = (*s / n).sqrt();
	}

	for row in rows.iter_mut() {
		for (i, v) in row.iter_mut().enumerate() {
			*v = if stddevs[i] != 0.0 {
				(*v - means[i]) / stddevs[i]
			} else {
				0.0
			};
		}
	}
}

// ---------------------------------------------------------------------------
// Lloyd steps
// ---------------------------------------------------------------------------

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
	a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Nearest centroid for every point. Strict `<` keeps the lowest index on ties.
pub fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<SegmentLabel> {
	points
		.iter()
		.map(|point| {
			let mut best = 0;
			let mut best_distance = f64::INFINITY;
			for (j, centroid) in centroids.iter().enumerate() {
				let distance = squared_distance(point, centroid);
				if distance < best_distance {
					best_distance = distance;
					best = j;
				}
			}
			best
		})
		.collect()
}

/// Mean of each cluster's points. A cluster with no points keeps `previous`.
pub fn update_centroids(
	points: &[Vec<f64>],
	labels: &[SegmentLabel],
	previous: &[Vec<f64>],
) -> Vec<Vec<f64>> {
	let width = previous.first().map_or(0, |c| c.len());
	let mut sums = vec![vec![0.0; width]; previous.len()];
	let mut counts = vec![0usize; previous.len()];

	for (point, &label) in points.iter().zip(labels) {
		for (s, v) in sums[label].iter_mut().zip(point) {
			*s += v;
		}
		counts[label] += 1;
	}

	sums.into_iter()
		.zip(counts)
		.zip(previous)
		.map(|((sum, count), prev)| {
			if count == 0 {
				prev.clone()
			} else {
				sum.into_iter().map(|s| s / count as f64).collect()
			}
		})
		.collect()
}

// ---------------------------------------------------------------------------
// Clusterer
// ---------------------------------------------------------------------------

/// Result of one k-means run.
#[derive(Debug, Clone, Serialize)]
pub struct Clustering {
	pub labels: Vec<SegmentLabel>,
	pub centroids: Vec<Vec<f64>>,
	pub iterations: usize,
	/// False when the iteration cap was reached before a stable pass.
	pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentAssignment {
	pub customer_id: String,
	pub segment: SegmentLabel,
}

/// Segment labels keyed back to the feature rows they came from.
#[derive(Debug, Clone)]
pub struct Segmentation {
	pub assignments: Vec<SegmentAssignment>,
	pub clustering: Clustering,
}

#[derive(Debug, Clone)]
pub struct Clusterer {
	k: usize,
	max_iterations: usize,
	seed: Option<u64>,
}

impl Clusterer {
	pub fn new(k: usize) -> Self {
		Self {
			k,
			max_iterations: DEFAULT_MAX_ITERATIONS,
			seed: None,
		}
	}

	pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
		self.max_iterations = max_iterations;
		self
	}

	pub fn with_seed(mut self, seed: u64) -> Self {
		self.seed = Some(seed);
		self
	}

	pub fn with_optional_seed(mut self, seed: Option<u64>) -> Self {
		self.seed = seed;
		self
	}

	/// Normalize the rows' features and cluster them.
	pub fn segment(&self, rows: &[CustomerFeatureRow]) -> Result<Segmentation, EngineError> {
		let mut points: Vec<Vec<f64>> = rows.iter().map(|r| r.features().to_vec()).collect();
		normalize_features(&mut points);
		let clustering = self.fit(&points)?;
		let assignments = rows
			.iter()
			.zip(&clustering.labels)
			.map(|(row, &segment)| SegmentAssignment {
				customer_id: row.customer_id.clone(),
				segment,
			})
			.collect();
		Ok(Segmentation {
			assignments,
			clustering,
		})
	}

	/// Run k-means over already-normalized points.
	pub fn fit(&self, points: &[Vec<f64>]) -> Result<Clustering, EngineError> {
		self.validate(points)?;

		let mut rng = match self.seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};
		let mut centroids = seed_centroids(points, self.k, &mut rng);

		// usize::MAX never matches a real label, so the first pass always "changes"
		let mut labels = vec![SegmentLabel::MAX; points.len()];
		let mut iterations = 0;
		let mut converged = false;

		while iterations < self.max_iterations {
			iterations += 1;
			let next = assign(points, &centroids);
			if next == labels {
				converged = true;
				break;
			}
			labels = next;
			centroids = update_centroids(points, &labels, &centroids);
		}

		if !converged {
			tracing::warn!(
				iterations,
				k = self.k,
				points = points.len(),
				"k-means hit the iteration cap before converging; using last assignment"
			);
		}

		Ok(Clustering {
			labels,
			centroids,
			iterations,
			converged,
		})
	}

	fn validate(&self, points: &[Vec<f64>]) -> Result<(), EngineError> {
		if self.k == 0 {
			return Err(EngineError::InvalidParameter(
				"cluster count must be at least 1".into(),
			));
		}
		if points.is_empty() {
			return Err(EngineError::DegenerateInput(
				"no customers to segment".into(),
			));
		}
		if self.k > points.len() {
			return Err(EngineError::InvalidParameter(format!(
				"cluster count {} exceeds customer count {}",
				self.k,
				points.len()
			)));
		}
		if self.max_iterations == 0 {
			return Err(EngineError::InvalidParameter(
				"max iterations must be at least 1".into(),
			));
		}
		let width = points[0].len();
		if points.iter().any(|p| p.len() != width) {
			return Err(EngineError::InvalidParameter(
				"feature rows have unequal widths".into(),
			));
		}
		Ok(())
	}
}

/// Draw `k` rows in random order, skipping rows equal to an already chosen
/// centroid. Duplicates are used only when fewer than `k` distinct rows exist.
fn seed_centroids(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
	let mut order: Vec<usize> = (0..points.len()).collect();
	order.shuffle(rng);

	let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
	let mut skipped = Vec::new();
	for &i in &order {
		if centroids.len() == k {
			break;
		}
		if centroids.iter().any(|c| c == &points[i]) {
			skipped.push(i);
		} else {
			centroids.push(points[i].clone());
		}
	}
	for i in skipped {
		if centroids.len() == k {
			break;
		}
		centroids.push(points[i].clone());
	}
	centroids
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(id: &str, f: [f64; 4]) -> CustomerFeatureRow {
		CustomerFeatureRow {
			customer_id: id.into(),
			interaction_count: f[0],
			purchase_count: f[1],
			total_spent: f[2],
			active_months: f[3],
		}
	}

	fn two_groups() -> Vec<CustomerFeatureRow> {
		vec![
			row("C1", [0.0, 0.0, 0.0, 0.0]),
			row("C2", [0.0, 0.0, 0.0, 0.0]),
			row("C3", [100.0, 50.0, 5000.0, 12.0]),
			row("C4", [120.0, 55.0, 5200.0, 12.0]),
		]
	}

	// -- normalize_features tests ---------------------------------------------

	#[test]
	fn normalize_produces_zero_mean_unit_variance() {
		let mut rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
		normalize_features(&mut rows);
		let mean: f64 = rows.iter().map(|r| r[0]).sum::<f64>() / 4.0;
		let var: f64 = rows.iter().map(|r| r[0].powi(2)).sum::<f64>() / 4.0;
		assert!(mean.abs() < 1e-12);
		assert!((var - 1.0).abs() < 1e-12);
	}

	#[test]
	fn normalize_constant_column_is_zero() {
		let mut rows = vec![vec![5.0, 1.0], vec![5.0, 3.0]];
		normalize_features(&mut rows);
		assert_eq!(rows[0][0], 0.0);
		assert_eq!(rows[1][0], 0.0);
		assert!((rows[0][1] + 1.0).abs() < 1e-12);
		assert!((rows[1][1] - 1.0).abs() < 1e-12);
	}

	#[test]
	fn normalize_empty_is_noop() {
		let mut rows: Vec<Vec<f64>> = Vec::new();
		normalize_features(&mut rows);
		assert!(rows.is_empty());
	}

	// -- assign / update tests ------------------------------------------------

	#[test]
	fn assign_breaks_ties_by_lowest_index() {
		let points = vec![vec![0.0]];
		let centroids = vec![vec![-1.0], vec![1.0]];
		assert_eq!(assign(&points, &centroids), vec![0]);
	}

	#[test]
	fn update_keeps_empty_cluster_in_place() {
		let points = vec![vec![1.0], vec![3.0]];
		let labels = vec![0, 0];
		let previous = vec![vec![0.0], vec![42.0]];
		let updated = update_centroids(&points, &labels, &previous);
		assert_eq!(updated, vec![vec![2.0], vec![42.0]]);
	}

	// -- fit tests ------------------------------------------------------------

	#[test]
	fn separates_idle_and_active_customers() {
		for seed in 0..20 {
			let segmentation = Clusterer::new(2).with_seed(seed).segment(&two_groups()).unwrap();
			let labels = &segmentation.clustering.labels;
			assert_eq!(labels[0], labels[1], "seed {seed}");
			assert_eq!(labels[2], labels[3], "seed {seed}");
			assert_ne!(labels[0], labels[2], "seed {seed}");
			assert!(segmentation.clustering.converged);
		}
	}

	#[test]
	fn labels_stay_in_range() {
		let rows: Vec<CustomerFeatureRow> = (0..30)
			.map(|i| {
				let x = i as f64;
				row(&format!("C{i}"), [x % 7.0, x % 3.0, x * 13.0 % 11.0, x % 5.0])
			})
			.collect();
		for k in 1..=6 {
			let seg = Clusterer::new(k).with_seed(7).segment(&rows).unwrap();
			assert_eq!(seg.assignments.len(), rows.len());
			assert!(seg.assignments.iter().all(|a| a.segment < k));
		}
	}

	#[test]
	fn converged_result_is_a_fixed_point() {
		let mut points: Vec<Vec<f64>> = (0..40)
			.map(|i| {
				let x = i as f64;
				vec![(x * 1.7).sin() * 10.0, (x * 0.3).cos() * 4.0, x % 9.0]
			})
			.collect();
		normalize_features(&mut points);
		let clustering = Clusterer::new(4).with_seed(3).fit(&points).unwrap();
		assert!(clustering.converged);
		assert_eq!(assign(&points, &clustering.centroids), clustering.labels);
	}

	#[test]
	fn same_seed_same_labels() {
		let a = Clusterer::new(2).with_seed(11).segment(&two_groups()).unwrap();
		let b = Clusterer::new(2).with_seed(11).segment(&two_groups()).unwrap();
		assert_eq!(a.clustering.labels, b.clustering.labels);
	}

	#[test]
	fn iteration_cap_returns_best_effort() {
		let mut points: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, (i * i % 17) as f64]).collect();
		normalize_features(&mut points);
		let clustering = Clusterer::new(5).with_seed(1).with_max_iterations(1).fit(&points).unwrap();
		assert_eq!(clustering.iterations, 1);
		assert!(!clustering.converged);
		assert_eq!(clustering.labels.len(), 50);
		assert!(clustering.labels.iter().all(|l| *l < 5));
	}

	#[test]
	fn single_cluster_takes_everyone() {
		let seg = Clusterer::new(1).segment(&two_groups()).unwrap();
		assert!(seg.clustering.labels.iter().all(|l| *l == 0));
	}

	#[test]
	fn identical_rows_do_not_break_seeding() {
		let rows = vec![row("A", [1.0; 4]), row("B", [1.0; 4]), row("C", [1.0; 4])];
		let seg = Clusterer::new(3).with_seed(5).segment(&rows).unwrap();
		// all rows collapse to one point; ties send everyone to centroid 0
		assert!(seg.clustering.labels.iter().all(|l| *l == 0));
		assert!(seg.clustering.converged);
	}

	// -- validation tests -----------------------------------------------------

	#[test]
	fn zero_k_is_invalid() {
		let err = Clusterer::new(0).segment(&two_groups()).unwrap_err();
		assert!(matches!(err, EngineError::InvalidParameter(_)));
	}

	#[test]
	fn k_above_customer_count_is_invalid() {
		let err = Clusterer::new(5).segment(&two_groups()).unwrap_err();
		assert!(matches!(err, EngineError::InvalidParameter(_)));
	}

	#[test]
	fn empty_input_is_degenerate() {
		let err = Clusterer::new(2).segment(&[]).unwrap_err();
		assert!(matches!(err, EngineError::DegenerateInput(_)));
	}

	#[test]
	fn zero_iteration_cap_is_invalid() {
		let err = Clusterer::new(2).with_max_iterations(0).segment(&two_groups()).unwrap_err();
		assert!(matches!(err, EngineError::InvalidParameter(_)));
	}
}
