// ---------------------------------------------------------------------------
// Recommender — three-tier fallback chain
// ---------------------------------------------------------------------------
//
// 1. Personalized: neighbors of the customer's most recent products,
//    interleaved round-robin.
// 2. Segment popularity: most-purchased products in the customer's segment.
// 3. Global popularity: catalog ordered by popularity score.
//
// A tier is skipped only when it yields nothing. Read-only throughout.
// ---------------------------------------------------------------------------

use std::collections::HashSet;

use crate::error::EngineError;
use crate::index::NeighborSource;
use crate::store::RecordStore;
use crate::types::{RecommendationResult, RecommendationStrategy};

pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_RECENT_INTERACTIONS: usize = 3;

/// Merge neighbor lists round-robin (first of each list, then second of
/// each, ...), dropping repeats, until `top_n` ids are collected.
pub fn interleave_neighbors(lists: &[Vec<String>], top_n: usize) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut merged = Vec::new();
	let longest = lists.iter().map(Vec::len).max().unwrap_or(0);

	'outer: for rank in 0..longest {
		for list in lists {
			if merged.len() >= top_n {
				break 'outer;
			}
			if let Some(id) = list.get(rank) {
				if seen.insert(id.as_str()) {
					merged.push(id.clone());
				}
			}
		}
	}
	merged
}

pub struct Recommender<'a> {
	store: &'a dyn RecordStore,
	neighbors: &'a dyn NeighborSource,
	recent_interactions: usize,
}

impl<'a> Recommender<'a> {
	pub fn new(store: &'a dyn RecordStore, neighbors: &'a dyn NeighborSource) -> Self {
		Self {
			store,
			neighbors,
			recent_interactions: DEFAULT_RECENT_INTERACTIONS,
		}
	}

	pub fn with_recent_interactions(mut self, recent_interactions: usize) -> Self {
		self.recent_interactions = recent_interactions;
		self
	}

	pub fn recommend(
		&self,
		customer_id: &str,
		top_n: usize,
	) -> Result<RecommendationResult, EngineError> {
		let personalized = self.personalized(customer_id, top_n)?;
		if !personalized.is_empty() {
			return Ok(RecommendationResult {
				product_ids: personalized,
				strategy: RecommendationStrategy::Personalized,
			});
		}
		tracing::debug!(customer_id, "No personalized candidates, trying segment popularity");

		let segment = self.segment_popular(customer_id, top_n)?;
		if !segment.is_empty() {
			return Ok(RecommendationResult {
				product_ids: segment,
				strategy: RecommendationStrategy::SegmentPopularity,
			});
		}
		tracing::debug!(customer_id, "No segment candidates, falling back to global popularity");

		Ok(RecommendationResult {
			product_ids: self.globally_popular(top_n)?,
			strategy: RecommendationStrategy::GlobalPopularity,
		})
	}

	/// Tier 1. Source products that are no longer in the index are skipped.
	pub fn personalized(&self, customer_id: &str, top_n: usize) -> Result<Vec<String>, EngineError> {
		let recent = self
			.store
			.list_customer_interactions(customer_id, self.recent_interactions)?;

		let mut sources = HashSet::new();
		let mut lists = Vec::new();
		for interaction in &recent {
			if !sources.insert(interaction.product_id.as_str()) {
				continue;
			}
			match self.neighbors.nearest_neighbors(&interaction.product_id, top_n) {
				Ok(list) => lists.push(list),
				Err(EngineError::NotFound(_)) => {
					tracing::debug!(
						customer_id,
						product_id = %interaction.product_id,
						kind = interaction.kind.as_str(),
						"Recent product missing from similarity index"
					);
				}
				Err(e) => return Err(e),
			}
		}

		Ok(interleave_neighbors(&lists, top_n))
	}

	/// Tier 2.
	pub fn segment_popular(&self, customer_id: &str, top_n: usize) -> Result<Vec<String>, EngineError> {
		let Some(segment) = self
			.store
			.find_customer(customer_id)?
			.and_then(|c| c.segment)
		else {
			return Ok(Vec::new());
		};

		let mut ranked = self.store.list_purchases_by_segment(segment)?;
		ranked.sort_by(|a, b| b.1.cmp(&a.1));
		Ok(ranked
			.into_iter()
			.filter(|(_, count)| *count > 0)
			.take(top_n)
			.map(|(id, _)| id)
			.collect())
	}

	/// Tier 3. Empty only when the catalog is empty.
	pub fn globally_popular(&self, top_n: usize) -> Result<Vec<String>, EngineError> {
		let mut products = self.store.list_products()?;
		products.sort_by(|a, b| b.popularity_score.total_cmp(&a.popularity_score));
		Ok(products.into_iter().take(top_n).map(|p| p.id).collect())
	}
}
