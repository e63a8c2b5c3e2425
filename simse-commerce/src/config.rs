use std::path::PathBuf;

use clap::Parser;

use crate::clustering::{DEFAULT_CLUSTERS, DEFAULT_MAX_ITERATIONS};
use crate::engine::EngineConfig;
use crate::recommendation::{DEFAULT_RECENT_INTERACTIONS, DEFAULT_TOP_N};
use crate::vectorizer::{VectorizerKind, DEFAULT_DIMENSIONS};

#[derive(Parser, Debug)]
#[command(
	name = "simse-commerce-engine",
	about = "Customer segmentation and product recommendation engine over JSON-RPC 2.0 / NDJSON stdio"
)]
pub struct CliArgs {
	/// JSON dataset to load before serving (products, customers, interactions, purchases)
	#[arg(long, env = "SIMSE_COMMERCE_DATA")]
	pub data: Option<PathBuf>,

	/// Number of customer segments
	#[arg(long, default_value_t = DEFAULT_CLUSTERS)]
	pub clusters: usize,

	/// k-means iteration cap
	#[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
	pub max_iterations: usize,

	/// Seed for centroid selection (random when omitted)
	#[arg(long)]
	pub seed: Option<u64>,

	/// Default number of recommendations per request
	#[arg(long, default_value_t = DEFAULT_TOP_N)]
	pub top_n: usize,

	/// Recent interactions consulted for personalized recommendations
	#[arg(long, default_value_t = DEFAULT_RECENT_INTERACTIONS)]
	pub recent_interactions: usize,

	/// Product vector dimensions
	#[arg(long, default_value_t = DEFAULT_DIMENSIONS)]
	pub dimensions: usize,

	/// Product text vectorizer
	#[arg(long, value_enum, default_value_t = VectorizerKind::TokenHash)]
	pub vectorizer: VectorizerKind,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, default_value = "info", env = "SIMSE_COMMERCE_LOG_LEVEL")]
	pub log_level: String,
}

impl CliArgs {
	pub fn engine_config(&self) -> EngineConfig {
		EngineConfig {
			clusters: self.clusters,
			max_iterations: self.max_iterations,
			seed: self.seed,
			top_n: self.top_n,
			recent_interactions: self.recent_interactions,
			dimensions: self.dimensions,
			vectorizer: self.vectorizer,
		}
	}
}
