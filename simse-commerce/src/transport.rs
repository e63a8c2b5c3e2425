use std::io::{self, Write};

use serde::Serialize;

#[derive(Serialize)]
struct JsonRpcResponse<'a> {
	jsonrpc: &'a str,
	id: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<JsonRpcErrorBody>,
}

#[derive(Serialize)]
struct JsonRpcErrorBody {
	code: i32,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	data: Option<serde_json::Value>,
}

/// Writes one JSON-RPC message per line. Generic over the sink so the
/// server can be driven in-process; the binary uses stdout.
pub struct NdjsonTransport<W: Write = io::Stdout> {
	out: W,
}

impl Default for NdjsonTransport {
	fn default() -> Self {
		Self::new()
	}
}

impl NdjsonTransport {
	pub fn new() -> Self {
		Self { out: io::stdout() }
	}
}

impl<W: Write> NdjsonTransport<W> {
	pub fn with_writer(out: W) -> Self {
		Self { out }
	}

	pub fn into_inner(self) -> W {
		self.out
	}

	pub fn write_response(&mut self, id: u64, result: serde_json::Value) {
		self.write_line(&JsonRpcResponse {
			jsonrpc: "2.0",
			id,
			result: Some(result),
			error: None,
		});
	}

	pub fn write_error(
		&mut self,
		id: u64,
		code: i32,
		message: impl Into<String>,
		data: Option<serde_json::Value>,
	) {
		self.write_line(&JsonRpcResponse {
			jsonrpc: "2.0",
			id,
			result: None,
			error: Some(JsonRpcErrorBody {
				code,
				message: message.into(),
				data,
			}),
		});
	}

	fn write_line(&mut self, value: &impl Serialize) {
		let mut line = match serde_json::to_vec(value) {
			Ok(bytes) => bytes,
			Err(e) => {
				tracing::error!("Failed to serialize: {}", e);
				return;
			}
		};
		line.push(b'\n');
		if let Err(e) = self.out.write_all(&line).and_then(|_| self.out.flush()) {
			tracing::error!("Failed to write response: {}", e);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lines(transport: NdjsonTransport<Vec<u8>>) -> Vec<serde_json::Value> {
		String::from_utf8(transport.into_inner())
			.unwrap()
			.lines()
			.map(|l| serde_json::from_str(l).unwrap())
			.collect()
	}

	#[test]
	fn response_omits_error() {
		let mut t = NdjsonTransport::with_writer(Vec::new());
		t.write_response(3, serde_json::json!({ "products": 2 }));
		let out = lines(t);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0]["jsonrpc"], "2.0");
		assert_eq!(out[0]["id"], 3);
		assert_eq!(out[0]["result"]["products"], 2);
		assert!(out[0].get("error").is_none());
	}

	#[test]
	fn error_carries_code_and_data() {
		let mut t = NdjsonTransport::with_writer(Vec::new());
		t.write_error(4, -32601, "Unknown method: nope", None);
		t.write_error(5, -32000, "Not found: P9", Some(serde_json::json!({ "commerceCode": "COMMERCE_NOT_FOUND" })));
		let out = lines(t);
		assert_eq!(out[0]["error"]["code"], -32601);
		assert!(out[0]["error"].get("data").is_none());
		assert!(out[0].get("result").is_none());
		assert_eq!(out[1]["error"]["data"]["commerceCode"], "COMMERCE_NOT_FOUND");
	}
}
