use serde::Deserialize;

// JSON-RPC 2.0 error codes
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const COMMERCE_ERROR: i32 = -32000;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
	pub id: u64,
	pub method: String,
	#[serde(default)]
	pub params: serde_json::Value,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn params_default_to_null() {
		let req: JsonRpcRequest =
			serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"method":"index/rebuild"}"#).unwrap();
		assert_eq!(req.id, 7);
		assert_eq!(req.method, "index/rebuild");
		assert!(req.params.is_null());
	}
}
