//! Framed JSON-RPC over stdio: `Content-Length: N\r\n\r\n<N bytes of JSON>`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::LspError;

/// Writes one framed JSON-RPC message.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, value: &serde_json::Value) -> Result<(), LspError> {
	let body = serde_json::to_vec(value)?;
	let header = format!("Content-Length: {}\r\n\r\n", body.len());
	writer.write_all(header.as_bytes()).await?;
	writer.write_all(&body).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads one framed JSON-RPC message, or `Ok(None)` at clean EOF.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Option<serde_json::Value>, LspError> {
	let mut content_length: Option<usize> = None;
	loop {
		let line = read_header_line(reader).await?;
		let Some(line) = line else { return Ok(None) };
		if line.is_empty() {
			break;
		}
		if let Some(value) = line.strip_prefix("Content-Length:") {
			content_length = Some(value.trim().parse().map_err(|_| LspError::Framing("malformed Content-Length".into()))?);
		}
	}

	let len = content_length.ok_or_else(|| LspError::Framing("missing Content-Length header".into()))?;
	let mut body = vec![0u8; len];
	reader.read_exact(&mut body).await?;
	let value = serde_json::from_slice(&body)?;
	Ok(Some(value))
}

async fn read_header_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Option<String>, LspError> {
	let mut bytes = Vec::new();
	loop {
		let mut byte = [0u8; 1];
		let n = reader.read(&mut byte).await?;
		if n == 0 {
			return Ok(None);
		}
		if byte[0] == b'\n' {
			if bytes.last() == Some(&b'\r') {
				bytes.pop();
			}
			break;
		}
		bytes.push(byte[0]);
	}
	Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let mut buf = Vec::new();
		let value = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
		write_message(&mut buf, &value).await.unwrap();

		let mut reader = BufReader::new(&buf[..]);
		let read_back = read_message(&mut reader).await.unwrap().unwrap();
		assert_eq!(read_back, value);
	}

	#[tokio::test]
	async fn read_at_clean_eof_returns_none() {
		let mut reader = BufReader::new(&b""[..]);
		assert!(read_message(&mut reader).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn round_trip_through_a_real_child_process() {
		// `cat` echoes stdin to stdout unmodified, so piping a framed
		// message through it exercises the exact reader/writer pair used
		// against a real language server's stdio pipes.
		let mut child = tokio::process::Command::new("cat")
			.stdin(std::process::Stdio::piped())
			.stdout(std::process::Stdio::piped())
			.spawn()
			.expect("cat must be available in test environment");

		let mut stdin = child.stdin.take().unwrap();
		let stdout = child.stdout.take().unwrap();
		let mut reader = BufReader::new(stdout);

		let value = json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}});
		write_message(&mut stdin, &value).await.unwrap();
		drop(stdin);

		let read_back = read_message(&mut reader).await.unwrap().unwrap();
		assert_eq!(read_back, value);
		let _ = child.kill().await;
	}
}
