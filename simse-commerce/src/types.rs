use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Cluster index assigned to a customer, in `[0, k)`. Carries no ordering.
pub type SegmentLabel = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub category: String,
	#[serde(default)]
	pub price: f64,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub popularity_score: f64,
}

impl Product {
	/// Text the similarity index vectorizes: name, description, then tags.
	pub fn feature_text(&self) -> String {
		let mut text = format!("{} {}", self.name, self.description);
		for tag in &self.tags {
			text.push(' ');
			text.push_str(tag);
		}
		text
	}

	pub fn validate(&self) -> Result<(), EngineError> {
		if self.id.is_empty() {
			return Err(EngineError::InvalidParameter("product id is empty".into()));
		}
		if !self.price.is_finite() || self.price < 0.0 {
			return Err(EngineError::InvalidParameter(format!(
				"product {} has invalid price {}",
				self.id, self.price
			)));
		}
		if !self.popularity_score.is_finite() || self.popularity_score < 0.0 {
			return Err(EngineError::InvalidParameter(format!(
				"product {} has invalid popularity score {}",
				self.id, self.popularity_score
			)));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
	View,
	CartAdd,
	Wishlist,
	Purchase,
	Search,
}

impl InteractionKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::View => "view",
			Self::CartAdd => "cart_add",
			Self::Wishlist => "wishlist",
			Self::Purchase => "purchase",
			Self::Search => "search",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
	pub customer_id: String,
	pub product_id: String,
	#[serde(rename = "type")]
	pub kind: InteractionKind,
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration_secs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
	pub customer_id: String,
	pub product_id: String,
	#[serde(default = "default_quantity")]
	pub quantity: u32,
	pub amount: f64,
	pub timestamp: DateTime<Utc>,
}

fn default_quantity() -> u32 {
	1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
	pub id: String,
	#[serde(default)]
	pub segment: Option<SegmentLabel>,
}

impl Customer {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			segment: None,
		}
	}
}

/// Behavioral features for one customer; all values are non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFeatureRow {
	pub customer_id: String,
	pub interaction_count: f64,
	pub purchase_count: f64,
	pub total_spent: f64,
	pub active_months: f64,
}

impl CustomerFeatureRow {
	pub fn features(&self) -> [f64; 4] {
		[
			self.interaction_count,
			self.purchase_count,
			self.total_spent,
			self.active_months,
		]
	}
}

/// Which tier of the fallback chain produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStrategy {
	Personalized,
	SegmentPopularity,
	GlobalPopularity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
	pub product_ids: Vec<String>,
	pub strategy: RecommendationStrategy,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn product(price: f64, popularity: f64) -> Product {
		Product {
			id: "P1".into(),
			name: "Wireless Headphones".into(),
			category: "Electronics".into(),
			price,
			description: "noise cancelling".into(),
			tags: vec!["audio".into(), "wireless".into()],
			popularity_score: popularity,
		}
	}

	#[test]
	fn feature_text_joins_name_description_tags() {
		assert_eq!(
			product(1.0, 1.0).feature_text(),
			"Wireless Headphones noise cancelling audio wireless"
		);
	}

	#[test]
	fn validate_rejects_negative_price() {
		assert!(product(-1.0, 1.0).validate().is_err());
		assert!(product(f64::NAN, 1.0).validate().is_err());
	}

	#[test]
	fn validate_rejects_negative_popularity() {
		assert!(product(1.0, -0.5).validate().is_err());
		assert!(product(0.0, 0.0).validate().is_ok());
	}

	#[test]
	fn interaction_kind_wire_names() {
		let json = serde_json::to_string(&InteractionKind::CartAdd).unwrap();
		assert_eq!(json, "\"cart_add\"");
		assert_eq!(InteractionKind::Wishlist.as_str(), "wishlist");
	}

	#[test]
	fn interaction_deserializes_type_field() {
		let raw = r#"{"customerId":"C1","productId":"P1","type":"view","timestamp":"2024-03-01T10:00:00Z","durationSecs":120}"#;
		let interaction: Interaction = serde_json::from_str(raw).unwrap();
		assert_eq!(interaction.kind, InteractionKind::View);
		assert_eq!(interaction.duration_secs, Some(120));
	}
}
