use thiserror::Error;

/// Failures reported by a [`RecordStore`](crate::store::RecordStore).
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Store unavailable: {0}")]
	Unavailable(String),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Malformed dataset: {0}")]
	Parse(String),
	#[error("Record missing: {0}")]
	MissingRecord(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Invalid parameter: {0}")]
	InvalidParameter(String),
	#[error("Data unavailable: {0}")]
	DataUnavailable(#[from] StoreError),
	#[error("Degenerate input: {0}")]
	DegenerateInput(String),
	#[error("Engine not initialized: call engine/initialize first")]
	NotInitialized,
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Serialization error: {0}")]
	Serialization(String),
}

impl EngineError {
	pub fn code(&self) -> &str {
		match self {
			Self::NotFound(_) => "COMMERCE_NOT_FOUND",
			Self::InvalidParameter(_) => "COMMERCE_INVALID_PARAMETER",
			Self::DataUnavailable(_) => "COMMERCE_DATA_UNAVAILABLE",
			Self::DegenerateInput(_) => "COMMERCE_DEGENERATE_INPUT",
			Self::NotInitialized => "COMMERCE_NOT_INITIALIZED",
			Self::Io(_) => "COMMERCE_IO",
			Self::Serialization(_) => "COMMERCE_SERIALIZATION",
		}
	}

	pub fn to_json_rpc_error(&self) -> serde_json::Value {
		serde_json::json!({
			"commerceCode": self.code(),
			"message": self.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn store_errors_become_data_unavailable() {
		let err: EngineError = StoreError::Unavailable("connection refused".into()).into();
		assert_eq!(err.code(), "COMMERCE_DATA_UNAVAILABLE");
		assert!(err.to_string().contains("connection refused"));
	}

	#[test]
	fn json_rpc_error_carries_code_and_message() {
		let err = EngineError::NotFound("product P9".into());
		let value = err.to_json_rpc_error();
		assert_eq!(value["commerceCode"], "COMMERCE_NOT_FOUND");
		assert_eq!(value["message"], "Not found: product P9");
	}
}
