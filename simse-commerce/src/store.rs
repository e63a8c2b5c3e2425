// ---------------------------------------------------------------------------
// RecordStore — the record-store collaborator the engine reads from
// ---------------------------------------------------------------------------
//
// The engine never persists anything itself. It reads catalog and history
// through `RecordStore` and writes exactly one thing back: segment labels.
//
// `InMemoryStore` is the reference implementation used by the JSON-RPC
// server and the tests. Its dataset lives in `im` persistent vectors, so
// `snapshot()` is a cheap structural clone.
// ---------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::features::aggregate_behavior;
use crate::types::{Customer, CustomerFeatureRow, Interaction, Product, Purchase, SegmentLabel};

pub trait RecordStore: Send + Sync {
	fn list_products(&self) -> Result<Vec<Product>, StoreError>;
	fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;
	fn list_interactions(&self) -> Result<Vec<Interaction>, StoreError>;
	fn list_purchases(&self) -> Result<Vec<Purchase>, StoreError>;

	/// A customer's interactions, most recent first, at most `limit`.
	fn list_customer_interactions(
		&self,
		customer_id: &str,
		limit: usize,
	) -> Result<Vec<Interaction>, StoreError>;

	fn find_customer(&self, customer_id: &str) -> Result<Option<Customer>, StoreError>;

	/// `(product_id, purchase_count)` over every customer currently in `segment`.
	fn list_purchases_by_segment(
		&self,
		segment: SegmentLabel,
	) -> Result<Vec<(String, u64)>, StoreError>;

	fn write_segment_label(&self, customer_id: &str, segment: SegmentLabel) -> Result<(), StoreError>;

	/// Stores that can aggregate natively (e.g. in SQL) should override this.
	fn aggregate_customer_behavior(&self) -> Result<Vec<CustomerFeatureRow>, StoreError> {
		Ok(aggregate_behavior(
			&self.list_customers()?,
			&self.list_interactions()?,
			&self.list_purchases()?,
		))
	}
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
	pub customers: im::Vector<Customer>,
	pub products: im::Vector<Product>,
	pub interactions: im::Vector<Interaction>,
	pub purchases: im::Vector<Purchase>,
}

impl Dataset {
	pub fn from_json(raw: &str) -> Result<Self, StoreError> {
		serde_json::from_str(raw).map_err(|e| StoreError::Parse(e.to_string()))
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let raw = std::fs::read_to_string(path)?;
		Self::from_json(&raw)
	}
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryStore {
	data: RwLock<Dataset>,
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_dataset(dataset: Dataset) -> Self {
		Self {
			data: RwLock::new(dataset),
		}
	}

	pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let path = path.as_ref();
		let dataset = Dataset::load(path)?;
		tracing::info!(
			path = %path.display(),
			products = dataset.products.len(),
			customers = dataset.customers.len(),
			"Loaded dataset"
		);
		Ok(Self::from_dataset(dataset))
	}

	/// Swap in a whole new dataset.
	pub fn replace(&self, dataset: Dataset) -> Result<(), StoreError> {
		*self.write()? = dataset;
		Ok(())
	}

	pub fn snapshot(&self) -> Result<Dataset, StoreError> {
		Ok(self.read()?.clone())
	}

	fn read(&self) -> Result<RwLockReadGuard<'_, Dataset>, StoreError> {
		self.data
			.read()
			.map_err(|_| StoreError::Unavailable("dataset lock poisoned".into()))
	}

	fn write(&self) -> Result<RwLockWriteGuard<'_, Dataset>, StoreError> {
		self.data
			.write()
			.map_err(|_| StoreError::Unavailable("dataset lock poisoned".into()))
	}
}

impl RecordStore for InMemoryStore {
	fn list_products(&self) -> Result<Vec<Product>, StoreError> {
		Ok(self.read()?.products.iter().cloned().collect())
	}

	fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
		Ok(self.read()?.customers.iter().cloned().collect())
	}

	fn list_interactions(&self) -> Result<Vec<Interaction>, StoreError> {
		Ok(self.read()?.interactions.iter().cloned().collect())
	}

	fn list_purchases(&self) -> Result<Vec<Purchase>, StoreError> {
		Ok(self.read()?.purchases.iter().cloned().collect())
	}

	fn list_customer_interactions(
		&self,
		customer_id: &str,
		limit: usize,
	) -> Result<Vec<Interaction>, StoreError> {
		let data = self.read()?;
		let mut matching: Vec<(usize, &Interaction)> = data
			.interactions
			.iter()
			.enumerate()
			.filter(|(_, i)| i.customer_id == customer_id)
			.collect();
		// equal timestamps: the later insert counts as more recent
		matching.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(b.0.cmp(&a.0)));
		Ok(matching
			.into_iter()
			.take(limit)
			.map(|(_, i)| i.clone())
			.collect())
	}

	fn find_customer(&self, customer_id: &str) -> Result<Option<Customer>, StoreError> {
		Ok(self
			.read()?
			.customers
			.iter()
			.find(|c| c.id == customer_id)
			.cloned())
	}

	fn list_purchases_by_segment(
		&self,
		segment: SegmentLabel,
	) -> Result<Vec<(String, u64)>, StoreError> {
		let data = self.read()?;
		let members: HashSet<&str> = data
			.customers
			.iter()
			.filter(|c| c.segment == Some(segment))
			.map(|c| c.id.as_str())
			.collect();
		let catalog: HashSet<&str> = data.products.iter().map(|p| p.id.as_str()).collect();

		let mut order: Vec<&str> = Vec::new();
		let mut counts: HashMap<&str, u64> = HashMap::new();
		for purchase in data.purchases.iter() {
			if !members.contains(purchase.customer_id.as_str())
				|| !catalog.contains(purchase.product_id.as_str())
			{
				continue;
			}
			let count = counts.entry(purchase.product_id.as_str()).or_insert_with(|| {
				order.push(purchase.product_id.as_str());
				0
			});
			*count += 1;
		}

		let mut ranked: Vec<(String, u64)> = order
			.into_iter()
			.map(|id| (id.to_string(), counts[id]))
			.collect();
		ranked.sort_by(|a, b| b.1.cmp(&a.1));
		Ok(ranked)
	}

	fn write_segment_label(&self, customer_id: &str, segment: SegmentLabel) -> Result<(), StoreError> {
		let mut data = self.write()?;
		// duplicate ids in a loaded dataset all move together
		let mut updated = 0;
		for customer in data.customers.iter_mut().filter(|c| c.id == customer_id) {
			customer.segment = Some(segment);
			updated += 1;
		}
		if updated == 0 {
			return Err(StoreError::MissingRecord(format!("customer {}", customer_id)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::InteractionKind;
	use chrono::{TimeZone, Utc};
	use std::io::Write;

	fn interaction(customer: &str, product: &str, minute: u32) -> Interaction {
		Interaction {
			customer_id: customer.into(),
			product_id: product.into(),
			kind: InteractionKind::View,
			timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap(),
			duration_secs: None,
		}
	}

	fn purchase(customer: &str, product: &str) -> Purchase {
		Purchase {
			customer_id: customer.into(),
			product_id: product.into(),
			quantity: 1,
			amount: 10.0,
			timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
		}
	}

	fn listed(id: &str) -> Product {
		Product {
			id: id.into(),
			name: id.into(),
			category: String::new(),
			price: 1.0,
			description: String::new(),
			tags: Vec::new(),
			popularity_score: 1.0,
		}
	}

	fn segmented(id: &str, segment: SegmentLabel) -> Customer {
		Customer {
			id: id.into(),
			segment: Some(segment),
		}
	}

	// -- interactions ---------------------------------------------------------

	#[test]
	fn customer_interactions_most_recent_first() {
		let mut dataset = Dataset::default();
		dataset.interactions.push_back(interaction("C1", "P1", 1));
		dataset.interactions.push_back(interaction("C1", "P2", 30));
		dataset.interactions.push_back(interaction("C2", "P9", 59));
		dataset.interactions.push_back(interaction("C1", "P3", 10));
		let store = InMemoryStore::from_dataset(dataset);

		let recent = store.list_customer_interactions("C1", 10).unwrap();
		let ids: Vec<&str> = recent.iter().map(|i| i.product_id.as_str()).collect();
		assert_eq!(ids, vec!["P2", "P3", "P1"]);

		let limited = store.list_customer_interactions("C1", 2).unwrap();
		assert_eq!(limited.len(), 2);
	}

	#[test]
	fn equal_timestamps_prefer_later_insert() {
		let mut dataset = Dataset::default();
		dataset.interactions.push_back(interaction("C1", "P1", 5));
		dataset.interactions.push_back(interaction("C1", "P2", 5));
		let store = InMemoryStore::from_dataset(dataset);
		let recent = store.list_customer_interactions("C1", 1).unwrap();
		assert_eq!(recent[0].product_id, "P2");
	}

	// -- segments -------------------------------------------------------------

	#[test]
	fn purchases_by_segment_ranked_by_count() {
		let mut dataset = Dataset::default();
		dataset.customers.push_back(segmented("C1", 0));
		dataset.customers.push_back(segmented("C2", 0));
		dataset.customers.push_back(segmented("C3", 1));
		for id in ["P1", "P2", "P3"] {
			dataset.products.push_back(listed(id));
		}
		for (c, p) in [("C1", "P1"), ("C1", "P2"), ("C2", "P2"), ("C3", "P3"), ("C3", "P3")] {
			dataset.purchases.push_back(purchase(c, p));
		}
		let store = InMemoryStore::from_dataset(dataset);
		assert_eq!(
			store.list_purchases_by_segment(0).unwrap(),
			vec![("P2".to_string(), 2), ("P1".to_string(), 1)]
		);
		assert_eq!(store.list_purchases_by_segment(1).unwrap(), vec![("P3".to_string(), 2)]);
		assert!(store.list_purchases_by_segment(7).unwrap().is_empty());
	}

	#[test]
	fn write_segment_label_updates_customer() {
		let mut dataset = Dataset::default();
		dataset.customers.push_back(Customer::new("C1"));
		let store = InMemoryStore::from_dataset(dataset);
		store.write_segment_label("C1", 3).unwrap();
		assert_eq!(store.find_customer("C1").unwrap().unwrap().segment, Some(3));
	}

	#[test]
	fn purchases_of_products_no_longer_in_catalog_are_not_ranked() {
		let mut dataset = Dataset::default();
		dataset.products.push_back(listed("P1"));
		dataset.customers.push_back(segmented("C1", 0));
		dataset.purchases.push_back(purchase("C1", "GONE"));
		dataset.purchases.push_back(purchase("C1", "GONE"));
		dataset.purchases.push_back(purchase("C1", "P1"));
		let store = InMemoryStore::from_dataset(dataset);
		assert_eq!(store.list_purchases_by_segment(0).unwrap(), vec![("P1".to_string(), 1)]);
	}

	#[test]
	fn write_segment_label_updates_every_duplicate_id() {
		let mut dataset = Dataset::default();
		dataset.products.push_back(listed("P1"));
		dataset.customers.push_back(segmented("C1", 0));
		dataset.customers.push_back(Customer::new("C2"));
		dataset.customers.push_back(segmented("C1", 0));
		dataset.purchases.push_back(purchase("C1", "P1"));
		let store = InMemoryStore::from_dataset(dataset);
		store.write_segment_label("C1", 2).unwrap();

		let data = store.snapshot().unwrap();
		let labels: Vec<Option<SegmentLabel>> = data
			.customers
			.iter()
			.filter(|c| c.id == "C1")
			.map(|c| c.segment)
			.collect();
		assert_eq!(labels, vec![Some(2), Some(2)]);
		assert!(store.list_purchases_by_segment(0).unwrap().is_empty());
	}

	#[test]
	fn write_segment_label_unknown_customer_fails() {
		let store = InMemoryStore::new();
		let err = store.write_segment_label("C404", 0).unwrap_err();
		assert!(matches!(err, StoreError::MissingRecord(_)));
	}

	#[test]
	fn snapshot_is_unaffected_by_later_writes() {
		let mut dataset = Dataset::default();
		dataset.customers.push_back(Customer::new("C1"));
		let store = InMemoryStore::from_dataset(dataset);
		let before = store.snapshot().unwrap();
		store.write_segment_label("C1", 1).unwrap();
		assert_eq!(before.customers[0].segment, None);
	}

	// -- aggregation ----------------------------------------------------------

	#[test]
	fn default_aggregation_covers_every_customer() {
		let mut dataset = Dataset::default();
		dataset.customers.push_back(Customer::new("C1"));
		dataset.customers.push_back(Customer::new("C2"));
		dataset.interactions.push_back(interaction("C1", "P1", 0));
		dataset.purchases.push_back(purchase("C1", "P1"));
		let store = InMemoryStore::from_dataset(dataset);
		let rows = store.aggregate_customer_behavior().unwrap();
		assert_eq!(rows.len(), 2);
		assert_eq!(rows[0].features(), [1.0, 1.0, 10.0, 1.0]);
		assert_eq!(rows[1].features(), [0.0, 0.0, 0.0, 0.0]);
	}

	// -- loading --------------------------------------------------------------

	#[test]
	fn load_from_path_reads_json_dataset() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"{{
				"customers": [{{ "id": "C1" }}],
				"products": [{{ "id": "P1", "name": "Running Shoes", "price": 79.99, "popularityScore": 7.8 }}],
				"purchases": [{{ "customerId": "C1", "productId": "P1", "amount": 79.99, "timestamp": "2024-02-10T08:00:00Z" }}]
			}}"#
		)
		.unwrap();
		let store = InMemoryStore::load_from_path(file.path()).unwrap();
		let products = store.list_products().unwrap();
		assert_eq!(products[0].name, "Running Shoes");
		assert_eq!(store.list_purchases().unwrap()[0].quantity, 1);
		assert!(store.list_interactions().unwrap().is_empty());
	}

	#[test]
	fn malformed_dataset_is_parse_error() {
		let err = Dataset::from_json("{ not json").unwrap_err();
		assert!(matches!(err, StoreError::Parse(_)));
	}

	#[test]
	fn missing_file_is_io_error() {
		let err = InMemoryStore::load_from_path("/definitely/not/here.json").unwrap_err();
		assert!(matches!(err, StoreError::Io(_)));
	}
}
