// ---------------------------------------------------------------------------
// SimilarityIndex — per-product vectors and nearest-neighbor queries
// ---------------------------------------------------------------------------
//
// One vector per product, derived from `Product::feature_text`. Queries are
// a linear cosine scan, O(N) per lookup. The index never notices catalog
// changes on its own; callers rebuild it.
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

use crate::cosine::{compute_magnitude, cosine_similarity_with_magnitude};
use crate::error::EngineError;
use crate::types::Product;
use crate::vectorizer::Vectorizer;

/// Anything that can answer "which products are most like this one".
pub trait NeighborSource: Send + Sync {
	/// Up to `top_n` product ids, most similar first, never `product_id` itself.
	fn nearest_neighbors(&self, product_id: &str, top_n: usize) -> Result<Vec<String>, EngineError>;
}

struct ProductVector {
	product_id: String,
	vector: Vec<f64>,
	magnitude: f64,
}

pub struct SimilarityIndex {
	vectorizer: Arc<dyn Vectorizer>,
	entries: Vec<ProductVector>,
	positions: HashMap<String, usize>,
}

impl SimilarityIndex {
	/// Create an empty index.
	pub fn new(vectorizer: Arc<dyn Vectorizer>) -> Self {
		Self {
			vectorizer,
			entries: Vec::new(),
			positions: HashMap::new(),
		}
	}

	pub fn build<'a, I>(vectorizer: Arc<dyn Vectorizer>, products: I) -> Self
	where
		I: IntoIterator<Item = &'a Product>,
	{
		let mut index = Self::new(vectorizer);
		index.rebuild(products);
		index
	}

	/// Clear and repopulate from `products`, keeping their order.
	pub fn rebuild<'a, I>(&mut self, products: I)
	where
		I: IntoIterator<Item = &'a Product>,
	{
		self.entries.clear();
		self.positions.clear();

		for product in products {
			if self.positions.contains_key(&product.id) {
				tracing::warn!(product_id = %product.id, "Duplicate product id skipped during index rebuild");
				continue;
			}
			let vector = self.vectorizer.vectorize(&product.feature_text());
			let magnitude = compute_magnitude(&vector);
			self.positions.insert(product.id.clone(), self.entries.len());
			self.entries.push(ProductVector {
				product_id: product.id.clone(),
				vector,
				magnitude,
			});
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, product_id: &str) -> bool {
		self.positions.contains_key(product_id)
	}

	pub fn dimensions(&self) -> usize {
		self.vectorizer.dimensions()
	}

	pub fn vector(&self, product_id: &str) -> Option<&[f64]> {
		self.positions
			.get(product_id)
			.map(|&i| self.entries[i].vector.as_slice())
	}

	/// Product ids in insertion order.
	pub fn product_ids(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(|e| e.product_id.as_str())
	}

	fn position(&self, product_id: &str) -> Result<usize, EngineError> {
		self.positions
			.get(product_id)
			.copied()
			.ok_or_else(|| EngineError::NotFound(format!("product {}", product_id)))
	}

	pub fn similarity(&self, a: &str, b: &str) -> Result<f64, EngineError> {
		let ea = &self.entries[self.position(a)?];
		let eb = &self.entries[self.position(b)?];
		Ok(cosine_similarity_with_magnitude(
			&ea.vector,
			&eb.vector,
			ea.magnitude,
			eb.magnitude,
		))
	}

	/// Like [`NeighborSource::nearest_neighbors`], with the cosine score.
	/// Equal scores keep catalog insertion order.
	pub fn nearest_neighbors_scored(
		&self,
		product_id: &str,
		top_n: usize,
	) -> Result<Vec<(String, f64)>, EngineError> {
		let query_pos = self.position(product_id)?;
		let query = &self.entries[query_pos];

		let mut scored: Vec<(usize, f64)> = self
			.entries
			.iter()
			.enumerate()
			.filter(|(i, _)| *i != query_pos)
			.map(|(i, e)| {
				let sim = cosine_similarity_with_magnitude(
					&query.vector,
					&e.vector,
					query.magnitude,
					e.magnitude,
				);
				(i, sim)
			})
			.collect();

		// sort_by is stable
		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		scored.truncate(top_n);

		Ok(scored
			.into_iter()
			.map(|(i, sim)| (self.entries[i].product_id.clone(), sim))
			.collect())
	}
}

impl NeighborSource for SimilarityIndex {
	fn nearest_neighbors(&self, product_id: &str, top_n: usize) -> Result<Vec<String>, EngineError> {
		Ok(self
			.nearest_neighbors_scored(product_id, top_n)?
			.into_iter()
			.map(|(id, _)| id)
			.collect())
	}
}
