// ---------------------------------------------------------------------------
// CommerceServer — JSON-RPC dispatcher
// ---------------------------------------------------------------------------
//
// Routes incoming JSON-RPC 2.0 requests (NDJSON over stdin) to a
// `CommerceEngine`: a main `run()` loop, a `dispatch()` match, `with_engine`
// helpers, and free-standing handler functions for each method.
// ---------------------------------------------------------------------------

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::engine::{CommerceEngine, EngineConfig};
use crate::error::EngineError;
use crate::protocol::*;
use crate::store::{Dataset, InMemoryStore, RecordStore};
use crate::transport::NdjsonTransport;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// The engine together with the in-memory store it reads from.
struct Loaded {
	store: Arc<InMemoryStore>,
	engine: CommerceEngine,
}

/// JSON-RPC server that dispatches requests to a [`CommerceEngine`].
pub struct CommerceServer<W: Write = io::Stdout> {
	transport: NdjsonTransport<W>,
	defaults: EngineConfig,
	loaded: Option<Loaded>,
}

impl<W: Write> CommerceServer<W> {
	/// Create a server. The engine is built by `engine/initialize` or
	/// [`initialize_from_path`](Self::initialize_from_path).
	pub fn new(transport: NdjsonTransport<W>, defaults: EngineConfig) -> Self {
		Self {
			transport,
			defaults,
			loaded: None,
		}
	}

	pub fn into_transport(self) -> NdjsonTransport<W> {
		self.transport
	}

	/// Load a dataset file with the default config. Returns the indexed product count.
	pub fn initialize_from_path(&mut self, path: &Path) -> Result<usize, EngineError> {
		let store = InMemoryStore::load_from_path(path)?;
		self.install(store, self.defaults.clone())
	}

	/// Main loop: read JSON-RPC messages from stdin, dispatch to handlers.
	pub fn run(&mut self) -> Result<(), EngineError> {
		let stdin = io::stdin();
		self.serve(stdin.lock())
	}

	/// Serve every request line from `reader` until EOF.
	pub fn serve<R: BufRead>(&mut self, reader: R) -> Result<(), EngineError> {
		for line_result in reader.lines() {
			let line = line_result?;
			if line.trim().is_empty() {
				continue;
			}

			let request: JsonRpcRequest = match serde_json::from_str(&line) {
				Ok(r) => r,
				Err(e) => {
					tracing::error!("Failed to parse request: {}", e);
					continue;
				}
			};

			self.dispatch(request);
		}

		Ok(())
	}

	// ── Dispatch ──────────────────────────────────────────────────────────

	fn dispatch(&mut self, req: JsonRpcRequest) {
		let id = req.id;
		let result = match req.method.as_str() {
			// -- Lifecycle -----------------------------------------------
			"engine/initialize" => self.handle_initialize(req.params),
			"store/load" => self.with_engine(|l| handle_load(l, req.params)),

			// -- Similarity ----------------------------------------------
			"index/rebuild" => self.with_engine(|l| {
				let products = l.engine.rebuild_index()?;
				Ok(serde_json::json!({ "products": products }))
			}),
			"index/similar" => self.with_engine(|l| handle_similar(&l.engine, req.params)),

			// -- Segmentation --------------------------------------------
			"segments/run" => self.with_engine(|l| handle_run_segments(&l.engine, req.params)),
			"segments/get" => self.with_engine(|l| handle_get_segment(l, req.params)),

			// -- Recommendation ------------------------------------------
			"recommend/get" => self.with_engine(|l| handle_recommend(&l.engine, req.params)),

			// -- Unknown -------------------------------------------------
			_ => {
				self.transport.write_error(
					id,
					METHOD_NOT_FOUND,
					format!("Unknown method: {}", req.method),
					None,
				);
				return;
			}
		};

		match result {
			Ok(value) => self.transport.write_response(id, value),
			Err(e) => {
				let code = match e {
					EngineError::Serialization(_) => INVALID_PARAMS,
					_ => COMMERCE_ERROR,
				};
				self.transport
					.write_error(id, code, e.to_string(), Some(e.to_json_rpc_error()));
			}
		}
	}

	// ── Engine accessor ───────────────────────────────────────────────────

	fn with_engine<F>(&self, f: F) -> Result<serde_json::Value, EngineError>
	where
		F: FnOnce(&Loaded) -> Result<serde_json::Value, EngineError>,
	{
		match &self.loaded {
			Some(l) => f(l),
			None => Err(EngineError::NotInitialized),
		}
	}

	// ── Initialize ────────────────────────────────────────────────────────

	fn handle_initialize(
		&mut self,
		params: serde_json::Value,
	) -> Result<serde_json::Value, EngineError> {
		let p: InitializeParams = parse_params(params)?;
		let config = p.config.unwrap_or_else(|| self.defaults.clone());

		let store = match (p.dataset, p.data_path) {
			(Some(_), Some(_)) => {
				return Err(EngineError::InvalidParameter(
					"pass either dataset or dataPath, not both".into(),
				));
			}
			(Some(dataset), None) => InMemoryStore::from_dataset(dataset),
			(None, Some(path)) => InMemoryStore::load_from_path(path)?,
			(None, None) => InMemoryStore::new(),
		};

		let products = self.install(store, config)?;
		Ok(serde_json::json!({ "products": products }))
	}

	fn install(&mut self, store: InMemoryStore, config: EngineConfig) -> Result<usize, EngineError> {
		let store = Arc::new(store);
		let engine = CommerceEngine::new(store.clone(), config)?;
		let products = engine.rebuild_index()?;
		self.loaded = Some(Loaded { store, engine });
		Ok(products)
	}
}

// ---------------------------------------------------------------------------
// Param types
// ---------------------------------------------------------------------------

/// Missing `params` is treated as an empty object.
fn parse_params<T: serde::de::DeserializeOwned>(
	params: serde_json::Value,
) -> Result<T, EngineError> {
	let params = if params.is_null() {
		serde_json::Value::Object(Default::default())
	} else {
		params
	};
	serde_json::from_value(params)
		.map_err(|e| EngineError::Serialization(format!("Invalid params: {}", e)))
}

/// Counts arrive as JSON integers; negatives are rejected here rather than
/// by serde so they surface as `InvalidParameter`.
fn count_param(name: &str, value: Option<i64>) -> Result<Option<usize>, EngineError> {
	match value {
		None => Ok(None),
		Some(n) if n < 0 => Err(EngineError::InvalidParameter(format!(
			"{} must not be negative, got {}",
			name, n
		))),
		Some(n) => usize::try_from(n)
			.map(Some)
			.map_err(|_| EngineError::InvalidParameter(format!("{} is too large", name))),
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
	config: Option<EngineConfig>,
	dataset: Option<Dataset>,
	data_path: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadParams {
	dataset: Dataset,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimilarParams {
	product_id: String,
	top_n: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunSegmentsParams {
	clusters: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerParams {
	customer_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendParams {
	customer_id: String,
	top_n: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_load(loaded: &Loaded, params: serde_json::Value) -> Result<serde_json::Value, EngineError> {
	let p: LoadParams = parse_params(params)?;
	// a rejected catalog must leave the store and the index as they were
	for product in p.dataset.products.iter() {
		product.validate()?;
	}
	loaded.store.replace(p.dataset)?;
	let products = loaded.engine.rebuild_index()?;
	Ok(serde_json::json!({ "products": products }))
}

fn handle_similar(
	engine: &CommerceEngine,
	params: serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
	let p: SimilarParams = parse_params(params)?;
	let top_n = count_param("topN", p.top_n)?.unwrap_or(engine.config().top_n);
	let product_ids = engine.similar_products(&p.product_id, top_n)?;
	Ok(serde_json::json!({ "productIds": product_ids }))
}

fn handle_run_segments(
	engine: &CommerceEngine,
	params: serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
	let p: RunSegmentsParams = parse_params(params)?;
	let report = match count_param("clusters", p.clusters)? {
		Some(k) => engine.run_segmentation_with(k)?,
		None => engine.run_segmentation()?,
	};
	serde_json::to_value(report).map_err(|e| EngineError::Serialization(e.to_string()))
}

fn handle_get_segment(
	loaded: &Loaded,
	params: serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
	let p: CustomerParams = parse_params(params)?;
	let customer = loaded
		.store
		.find_customer(&p.customer_id)?
		.ok_or_else(|| EngineError::NotFound(format!("customer {}", p.customer_id)))?;
	Ok(serde_json::json!({ "segment": customer.segment }))
}

fn handle_recommend(
	engine: &CommerceEngine,
	params: serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
	let p: RecommendParams = parse_params(params)?;
	let top_n = count_param("topN", p.top_n)?;
	let result = engine.recommend(&p.customer_id, top_n)?;
	serde_json::to_value(result).map_err(|e| EngineError::Serialization(e.to_string()))
}
