// ---------------------------------------------------------------------------
// Vectorizer — deterministic text → fixed-length feature vector
// ---------------------------------------------------------------------------
//
// Two hash-based schemes. Neither is an embedding model; both are pure and
// repeatable so that similarity comparisons are stable across rebuilds.
//
// - TokenHashVectorizer: feature hashing over lowercase alphanumeric tokens.
//   Texts sharing vocabulary land in shared buckets.
// - ModuloHashVectorizer: one hash of the whole text, coordinate
//   `i = (hash mod (i + 1)) / 100`.
// ---------------------------------------------------------------------------

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const DEFAULT_DIMENSIONS: usize = 128;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Stable across platforms and releases, unlike `DefaultHasher`.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
	let mut hash = FNV_OFFSET_BASIS;
	for &b in bytes {
		hash ^= b as u64;
		hash = hash.wrapping_mul(FNV_PRIME);
	}
	hash
}

/// Maps text to a vector of constant length. Implementations must be pure.
pub trait Vectorizer: Send + Sync {
	fn dimensions(&self) -> usize;
	fn vectorize(&self, text: &str) -> Vec<f64>;
}

// ---------------------------------------------------------------------------
// Token hashing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TokenHashVectorizer {
	dimensions: usize,
}

impl TokenHashVectorizer {
	pub fn new(dimensions: usize) -> Self {
		Self { dimensions }
	}
}

impl Default for TokenHashVectorizer {
	fn default() -> Self {
		Self::new(DEFAULT_DIMENSIONS)
	}
}

impl Vectorizer for TokenHashVectorizer {
	fn dimensions(&self) -> usize {
		self.dimensions
	}

	fn vectorize(&self, text: &str) -> Vec<f64> {
		let mut vector = vec![0.0; self.dimensions];
		if self.dimensions == 0 {
			return vector;
		}
		let lowered = text.to_lowercase();
		for token in lowered.split(|c: char| !c.is_alphanumeric()) {
			if token.is_empty() {
				continue;
			}
			let bucket = fnv1a_64(token.as_bytes()) % self.dimensions as u64;
			vector[bucket as usize] += 1.0;
		}
		vector
	}
}

// ---------------------------------------------------------------------------
// Whole-text modulo hashing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModuloHashVectorizer {
	dimensions: usize,
}

impl ModuloHashVectorizer {
	pub fn new(dimensions: usize) -> Self {
		Self { dimensions }
	}
}

impl Default for ModuloHashVectorizer {
	fn default() -> Self {
		Self::new(DEFAULT_DIMENSIONS)
	}
}

impl Vectorizer for ModuloHashVectorizer {
	fn dimensions(&self) -> usize {
		self.dimensions
	}

	fn vectorize(&self, text: &str) -> Vec<f64> {
		let hash = fnv1a_64(text.as_bytes());
		(0..self.dimensions)
			.map(|i| (hash % (i as u64 + 1)) as f64 / 100.0)
			.collect()
	}
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VectorizerKind {
	#[default]
	TokenHash,
	ModuloHash,
}

impl VectorizerKind {
	pub fn build(self, dimensions: usize) -> Result<Box<dyn Vectorizer>, EngineError> {
		if dimensions == 0 {
			return Err(EngineError::InvalidParameter(
				"vector dimensions must be at least 1".into(),
			));
		}
		Ok(match self {
			Self::TokenHash => Box::new(TokenHashVectorizer::new(dimensions)),
			Self::ModuloHash => Box::new(ModuloHashVectorizer::new(dimensions)),
		})
	}
}
