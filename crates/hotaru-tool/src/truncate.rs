//! Auto-truncation of oversized tool output, and the retention cleanup for
//! the full copies it writes aside.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ResultMetadata;

pub const MAX_LINES: usize = 2000;
pub const MAX_BYTES: usize = 50 * 1024;
pub const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Which slice of an oversized output a tool wants kept. Most tools want the
/// head (the beginning of a long `read`/`grep`); a tool whose most relevant
/// output is at the end (e.g. a long-running `bash` command's final lines)
/// asks for the tail instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncateDirection {
	#[default]
	Head,
	Tail,
}

/// On-disk sidecar recording when a truncated output was written, so the
/// retention sweep can judge age without trusting file mtimes (which a
/// backup/restore could perturb).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TruncationRecord {
	written_at: DateTime<Utc>,
	output: String,
}

/// If `output` exceeds the line/byte budget, writes the full text to
/// `<data_dir>/tool-output/<call_id>.json` and returns a head or tail slice
/// (per `direction`) plus a hint describing how to read the rest; otherwise
/// returns `output` unchanged with `metadata.truncated` left `false`.
pub async fn auto_truncate(data_dir: &Path, call_id: &str, output: String, direction: TruncateDirection) -> std::io::Result<(String, ResultMetadata)> {
	let line_count = output.lines().count();
	if line_count <= MAX_LINES && output.len() <= MAX_BYTES {
		return Ok((output, ResultMetadata::default()));
	}

	let output_dir = data_dir.join("tool-output");
	tokio::fs::create_dir_all(&output_dir).await?;
	let output_path = output_dir.join(format!("{call_id}.json"));

	let record = TruncationRecord {
		written_at: Utc::now(),
		output: output.clone(),
	};
	let bytes = serde_json::to_vec(&record).unwrap_or_default();
	tokio::fs::write(&output_path, bytes).await?;

	let (slice, hint) = match direction {
		TruncateDirection::Head => {
			let head: String = output.lines().take(MAX_LINES).collect::<Vec<_>>().join("\n");
			let hint = format!("\n\n[output truncated: {line_count} lines total, showing first {MAX_LINES}. Full output saved to {}]", output_path.display());
			(head, hint)
		}
		TruncateDirection::Tail => {
			let total = line_count;
			let skip = total.saturating_sub(MAX_LINES);
			let tail: String = output.lines().skip(skip).collect::<Vec<_>>().join("\n");
			let hint = format!("\n\n[output truncated: {line_count} lines total, showing last {MAX_LINES}. Full output saved to {}]", output_path.display());
			(tail, hint)
		}
	};

	Ok((
		format!("{slice}{hint}"),
		ResultMetadata {
			truncated: true,
			output_path: Some(output_path),
			extra: serde_json::Value::Null,
		},
	))
}

/// Deletes every truncated-output sidecar under `<data_dir>/tool-output`
/// whose embedded timestamp is older than [`RETENTION`]. Intended to run on
/// a periodic background loop (see `hotaru-runtime`).
pub async fn sweep_expired_outputs(data_dir: &Path) -> std::io::Result<usize> {
	let output_dir = data_dir.join("tool-output");
	let mut removed = 0;
	let mut entries = match tokio::fs::read_dir(&output_dir).await {
		Ok(entries) => entries,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
		Err(err) => return Err(err),
	};

	let now = Utc::now();
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) != Some("json") {
			continue;
		}
		let Ok(bytes) = tokio::fs::read(&path).await else { continue };
		let Ok(record): Result<TruncationRecord, _> = serde_json::from_slice(&bytes) else {
			continue;
		};
		let age = now.signed_duration_since(record.written_at);
		if age.to_std().unwrap_or_default() >= RETENTION {
			tokio::fs::remove_file(&path).await?;
			removed += 1;
		}
	}
	Ok(removed)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeDelta;

	#[tokio::test]
	async fn short_output_is_not_truncated() {
		let dir = tempfile::tempdir().unwrap();
		let (output, metadata) = auto_truncate(dir.path(), "call-1", "a few lines\nof output".to_string(), TruncateDirection::Head).await.unwrap();
		assert_eq!(output, "a few lines\nof output");
		assert!(!metadata.truncated);
		assert!(metadata.output_path.is_none());
	}

	#[tokio::test]
	async fn long_output_is_truncated_and_saved_in_full() {
		let dir = tempfile::tempdir().unwrap();
		let full: String = (0..5000).map(|i| format!("line {i}\n")).collect();
		let (output, metadata) = auto_truncate(dir.path(), "call-2", full.clone(), TruncateDirection::Head).await.unwrap();

		assert!(metadata.truncated);
		let saved_path = metadata.output_path.clone().unwrap();
		assert!(saved_path.exists());

		let head_lines = output.lines().filter(|l| l.starts_with("line ")).count();
		assert_eq!(head_lines, MAX_LINES);
		assert!(output.contains("line 0\n") || output.starts_with("line 0"));

		let saved_bytes = tokio::fs::read(&saved_path).await.unwrap();
		let record: TruncationRecord = serde_json::from_slice(&saved_bytes).unwrap();
		assert_eq!(record.output, full);
	}

	#[tokio::test]
	async fn tail_direction_keeps_the_last_lines_instead_of_the_first() {
		let dir = tempfile::tempdir().unwrap();
		let full: String = (0..5000).map(|i| format!("line {i}\n")).collect();
		let (output, metadata) = auto_truncate(dir.path(), "call-3", full.clone(), TruncateDirection::Tail).await.unwrap();

		assert!(metadata.truncated);
		let kept_lines: Vec<&str> = output.lines().filter(|l| l.starts_with("line ")).collect();
		assert_eq!(kept_lines.len(), MAX_LINES);
		assert_eq!(kept_lines.first().copied(), Some("line 3000"));
		assert_eq!(kept_lines.last().copied(), Some("line 4999"));
	}

	#[tokio::test]
	async fn sweep_removes_only_expired_records() {
		let dir = tempfile::tempdir().unwrap();
		let output_dir = dir.path().join("tool-output");
		tokio::fs::create_dir_all(&output_dir).await.unwrap();

		let fresh = TruncationRecord {
			written_at: Utc::now(),
			output: "fresh".into(),
		};
		let stale = TruncationRecord {
			written_at: Utc::now() - TimeDelta::days(8),
			output: "stale".into(),
		};
		tokio::fs::write(output_dir.join("fresh.json"), serde_json::to_vec(&fresh).unwrap()).await.unwrap();
		tokio::fs::write(output_dir.join("stale.json"), serde_json::to_vec(&stale).unwrap()).await.unwrap();

		let removed = sweep_expired_outputs(dir.path()).await.unwrap();
		assert_eq!(removed, 1);
		assert!(output_dir.join("fresh.json").exists());
		assert!(!output_dir.join("stale.json").exists());
	}

	#[tokio::test]
	async fn sweep_on_missing_directory_is_a_no_op() {
		let dir = tempfile::tempdir().unwrap();
		let removed = sweep_expired_outputs(dir.path()).await.unwrap();
		assert_eq!(removed, 0);
	}
}
