// ---------------------------------------------------------------------------
// Feature aggregation — per-customer behavioral features
// ---------------------------------------------------------------------------
//
// interaction_count  number of interaction records
// purchase_count     number of purchase records
// total_spent        sum of purchase amounts
// active_months      distinct calendar months (UTC) with at least one purchase
//
// Every known customer gets a row, all-zero if they have no history.
// ---------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};

use chrono::Datelike;

use crate::error::EngineError;
use crate::store::RecordStore;
use crate::types::{Customer, CustomerFeatureRow, Interaction, Purchase};

#[derive(Default)]
struct Accumulator {
	interactions: u64,
	purchases: u64,
	spent: f64,
	months: HashSet<(i32, u32)>,
}

/// Aggregate raw history into one row per customer, in `customers` order.
/// Records belonging to customers not in `customers` are ignored.
pub fn aggregate_behavior(
	customers: &[Customer],
	interactions: &[Interaction],
	purchases: &[Purchase],
) -> Vec<CustomerFeatureRow> {
	let mut acc: HashMap<&str, Accumulator> = customers
		.iter()
		.map(|c| (c.id.as_str(), Accumulator::default()))
		.collect();

	for interaction in interactions {
		if let Some(a) = acc.get_mut(interaction.customer_id.as_str()) {
			a.interactions += 1;
		}
	}

	for purchase in purchases {
		if let Some(a) = acc.get_mut(purchase.customer_id.as_str()) {
			a.purchases += 1;
			a.spent += purchase.amount;
			a.months
				.insert((purchase.timestamp.year(), purchase.timestamp.month()));
		}
	}

	let mut rows = Vec::with_capacity(customers.len());
	let mut seen = HashSet::new();
	for customer in customers {
		if !seen.insert(customer.id.as_str()) {
			continue;
		}
		let a = &acc[customer.id.as_str()];
		rows.push(CustomerFeatureRow {
			customer_id: customer.id.clone(),
			interaction_count: a.interactions as f64,
			purchase_count: a.purchases as f64,
			total_spent: a.spent,
			active_months: a.months.len() as f64,
		});
	}
	rows
}

/// Pulls feature rows from a record store.
pub struct FeatureAggregator;

impl FeatureAggregator {
	/// Any store failure is fatal for the run; no partial rows are returned.
	pub fn collect(store: &dyn RecordStore) -> Result<Vec<CustomerFeatureRow>, EngineError> {
		let rows = store.aggregate_customer_behavior()?;
		tracing::debug!(customers = rows.len(), "Aggregated customer behavior");
		Ok(rows)
	}
}
