//! A single MCP server connection: either a child process speaking
//! newline-delimited JSON-RPC 2.0 over stdio, or a remote HTTP(S) endpoint.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::error::{McpError, McpResult};
use crate::types::ToolDescriptor;

enum Transport {
	Local { child: Child, stdin: ChildStdin, stdout: BufReader<ChildStdout> },
	Remote { http: reqwest::Client, url: String, bearer_token: Option<String> },
}

pub struct MCPClient {
	name: String,
	transport: Mutex<Transport>,
	next_id: AtomicU64,
}

impl MCPClient {
	pub fn spawn_local(name: impl Into<String>, command: &str, args: &[String], env: &HashMap<String, String>) -> McpResult<Self> {
		let mut child = tokio::process::Command::new(command)
			.args(args)
			.envs(env)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.kill_on_drop(true)
			.spawn()?;

		let stdin = child.stdin.take().expect("stdin piped");
		let stdout = BufReader::new(child.stdout.take().expect("stdout piped"));

		Ok(Self { name: name.into(), transport: Mutex::new(Transport::Local { child, stdin, stdout }), next_id: AtomicU64::new(1) })
	}

	pub fn connect_remote(name: impl Into<String>, url: &str, bearer_token: Option<String>) -> Self {
		Self { name: name.into(), transport: Mutex::new(Transport::Remote { http: reqwest::Client::new(), url: url.to_string(), bearer_token }), next_id: AtomicU64::new(1) }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
		let response = self.request("tools/list", json!({})).await?;
		let tools = response.get("tools").cloned().unwrap_or(Value::Array(Vec::new()));
		Ok(serde_json::from_value(tools)?)
	}

	pub async fn call_tool(&self, tool: &str, arguments: Value) -> McpResult<String> {
		let response = self.request("tools/call", json!({"name": tool, "arguments": arguments})).await?;
		Ok(extract_text(&response))
	}

	async fn request(&self, method: &str, params: Value) -> McpResult<Value> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

		let mut transport = self.transport.lock().await;
		match &mut *transport {
			Transport::Local { stdin, stdout, .. } => {
				let mut line = serde_json::to_string(&request)?;
				line.push('\n');
				stdin.write_all(line.as_bytes()).await?;
				stdin.flush().await?;

				let mut response_line = String::new();
				let bytes_read = stdout.read_line(&mut response_line).await?;
				if bytes_read == 0 {
					return Err(McpError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "MCP server closed stdout")));
				}
				parse_response(&response_line)
			}
			Transport::Remote { http, url, bearer_token } => {
				let mut builder = http.post(url.as_str()).header(CONTENT_TYPE, "application/json").header(ACCEPT, "application/json, text/event-stream").json(&request);
				if let Some(token) = bearer_token {
					builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
				}

				let response = builder.send().await?;
				let content_type = response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
				let body = response.text().await?;

				if content_type.contains("text/event-stream") {
					parse_sse_response(&body)
				} else {
					parse_response(&body)
				}
			}
		}
	}

	pub async fn shutdown(self) {
		if let Transport::Local { mut child, .. } = self.transport.into_inner() {
			let _ = child.kill().await;
		}
	}
}

fn parse_response(body: &str) -> McpResult<Value> {
	let envelope: Value = serde_json::from_str(body.trim())?;
	if let Some(error) = envelope.get("error") {
		let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
		let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string();
		return Err(McpError::Rpc { code, message });
	}
	Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
}

fn parse_sse_response(body: &str) -> McpResult<Value> {
	let last_data = body
		.lines()
		.filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
		.last()
		.ok_or_else(|| McpError::Rpc { code: 0, message: "empty event stream response".to_string() })?;
	parse_response(last_data)
}

fn extract_text(result: &Value) -> String {
	result
		.get("content")
		.and_then(Value::as_array)
		.map(|blocks| blocks.iter().filter_map(|b| b.get("text").and_then(Value::as_str)).collect::<Vec<_>>().join("\n"))
		.unwrap_or_else(|| result.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_response_extracts_result() {
		let value = parse_response(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
		assert_eq!(value, json!({"tools": []}));
	}

	#[test]
	fn parse_response_surfaces_rpc_error() {
		let err = parse_response(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#).unwrap_err();
		assert!(matches!(err, McpError::Rpc { code: -32601, .. }));
	}

	#[test]
	fn parse_sse_response_takes_last_data_line() {
		let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
		let value = parse_sse_response(body).unwrap();
		assert_eq!(value, json!({}));
	}

	#[test]
	fn extract_text_joins_content_blocks() {
		let result = json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]});
		assert_eq!(extract_text(&result), "a\nb");
	}

	#[tokio::test]
	async fn local_client_lists_tools_from_a_stub_server() {
		let script = "read -r _; echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[{\"name\":\"echo\"}]}}'";
		let client = MCPClient::spawn_local("stub", "sh", &["-c".to_string(), script.to_string()], &HashMap::new()).unwrap();
		let tools = client.list_tools().await.unwrap();
		assert_eq!(tools[0].name, "echo");
		client.shutdown().await;
	}
}
