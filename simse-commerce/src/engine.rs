// ---------------------------------------------------------------------------
// CommerceEngine — index snapshots, segmentation runs, recommendations
// ---------------------------------------------------------------------------
//
// The similarity index is held as an `Arc` snapshot. A rebuild computes a
// fresh index without holding any lock, then swaps the pointer under a
// short write lock. Queries clone the current `Arc` and run lock-free, so
// concurrent readers never observe a half-built index. Rebuilds are
// serialized with each other so the last catalog read is the one swapped in.
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::clustering::{Clusterer, SegmentAssignment, DEFAULT_CLUSTERS, DEFAULT_MAX_ITERATIONS};
use crate::error::EngineError;
use crate::features::FeatureAggregator;
use crate::index::{NeighborSource, SimilarityIndex};
use crate::recommendation::{Recommender, DEFAULT_RECENT_INTERACTIONS, DEFAULT_TOP_N};
use crate::store::RecordStore;
use crate::types::RecommendationResult;
use crate::vectorizer::{Vectorizer, VectorizerKind, DEFAULT_DIMENSIONS};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
	pub clusters: usize,
	pub max_iterations: usize,
	/// Fixed seed for centroid selection; `None` draws from OS entropy.
	pub seed: Option<u64>,
	pub top_n: usize,
	pub recent_interactions: usize,
	pub dimensions: usize,
	pub vectorizer: VectorizerKind,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			clusters: DEFAULT_CLUSTERS,
			max_iterations: DEFAULT_MAX_ITERATIONS,
			seed: None,
			top_n: DEFAULT_TOP_N,
			recent_interactions: DEFAULT_RECENT_INTERACTIONS,
			dimensions: DEFAULT_DIMENSIONS,
			vectorizer: VectorizerKind::default(),
		}
	}
}

impl EngineConfig {
	pub fn validate(&self) -> Result<(), EngineError> {
		if self.clusters == 0 {
			return Err(EngineError::InvalidParameter("clusters must be at least 1".into()));
		}
		if self.max_iterations == 0 {
			return Err(EngineError::InvalidParameter(
				"maxIterations must be at least 1".into(),
			));
		}
		if self.dimensions == 0 {
			return Err(EngineError::InvalidParameter("dimensions must be at least 1".into()));
		}
		Ok(())
	}
}

/// Outcome of one segmentation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationReport {
	pub clusters: usize,
	pub iterations: usize,
	pub converged: bool,
	pub assignments: Vec<SegmentAssignment>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct CommerceEngine {
	store: Arc<dyn RecordStore>,
	vectorizer: Arc<dyn Vectorizer>,
	index: RwLock<Arc<SimilarityIndex>>,
	rebuild: Mutex<()>,
	config: EngineConfig,
}

impl CommerceEngine {
	/// Create an engine with an empty index. Call [`rebuild_index`](Self::rebuild_index)
	/// before asking for similar products.
	pub fn new(store: Arc<dyn RecordStore>, config: EngineConfig) -> Result<Self, EngineError> {
		config.validate()?;
		let vectorizer: Arc<dyn Vectorizer> = Arc::from(config.vectorizer.build(config.dimensions)?);
		let index = Arc::new(SimilarityIndex::new(vectorizer.clone()));
		Ok(Self {
			store,
			vectorizer,
			index: RwLock::new(index),
			rebuild: Mutex::new(()),
			config,
		})
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// The current index snapshot.
	pub fn index(&self) -> Arc<SimilarityIndex> {
		// The guarded value is a single Arc, so a poisoned lock still holds
		// a complete snapshot.
		match self.index.read() {
			Ok(guard) => guard.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	/// Re-read the catalog and swap in a fresh index. Returns the product count.
	pub fn rebuild_index(&self) -> Result<usize, EngineError> {
		// held from the catalog read to the swap; readers only need `index`
		let _serial = match self.rebuild.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		let products = self.store.list_products()?;
		for product in &products {
			product.validate()?;
		}

		let fresh = Arc::new(SimilarityIndex::build(self.vectorizer.clone(), &products));
		let count = fresh.len();

		match self.index.write() {
			Ok(mut guard) => *guard = fresh,
			Err(poisoned) => *poisoned.into_inner() = fresh,
		}

		tracing::info!(products = count, dimensions = self.vectorizer.dimensions(), "Similarity index rebuilt");
		Ok(count)
	}

	pub fn similar_products(&self, product_id: &str, top_n: usize) -> Result<Vec<String>, EngineError> {
		self.index().nearest_neighbors(product_id, top_n)
	}

	pub fn run_segmentation(&self) -> Result<SegmentationReport, EngineError> {
		self.run_segmentation_with(self.config.clusters)
	}

	/// Aggregate features, cluster, and write every label back to the store.
	/// Replaces all prior assignments.
	pub fn run_segmentation_with(&self, clusters: usize) -> Result<SegmentationReport, EngineError> {
		let rows = FeatureAggregator::collect(self.store.as_ref())?;
		if rows.is_empty() {
			return Err(EngineError::DegenerateInput("no customers to segment".into()));
		}

		let segmentation = Clusterer::new(clusters)
			.with_max_iterations(self.config.max_iterations)
			.with_optional_seed(self.config.seed)
			.segment(&rows)?;

		for assignment in &segmentation.assignments {
			self.store
				.write_segment_label(&assignment.customer_id, assignment.segment)?;
		}

		tracing::info!(
			customers = rows.len(),
			clusters,
			iterations = segmentation.clustering.iterations,
			converged = segmentation.clustering.converged,
			"Customer segmentation complete"
		);

		Ok(SegmentationReport {
			clusters,
			iterations: segmentation.clustering.iterations,
			converged: segmentation.clustering.converged,
			assignments: segmentation.assignments,
		})
	}

	/// Recommendations for one customer. `top_n` defaults to the configured value.
	pub fn recommend(
		&self,
		customer_id: &str,
		top_n: Option<usize>,
	) -> Result<RecommendationResult, EngineError> {
		let index = self.index();
		let top_n = top_n.unwrap_or(self.config.top_n);
		let result = Recommender::new(self.store.as_ref(), &*index)
			.with_recent_interactions(self.config.recent_interactions)
			.recommend(customer_id, top_n)?;
		tracing::debug!(
			customer_id,
			strategy = ?result.strategy,
			count = result.product_ids.len(),
			"Recommendations computed"
		);
		Ok(result)
	}
}
