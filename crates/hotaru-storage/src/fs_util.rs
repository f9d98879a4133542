//! Low-level atomic filesystem helpers shared by the storage and
//! transaction-log code.

use std::path::{Path, PathBuf};

use crate::error::{StorageError, StorageResult};

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
	StorageError::Io {
		path: path.to_path_buf(),
		source,
	}
}

/// Writes `bytes` to `path` atomically: write to a sibling temp file, fsync
/// it, then rename over the destination. When `durable` is set, the parent
/// directory is also fsynced after the rename so the rename itself survives
/// a crash.
pub async fn atomic_write(path: &Path, bytes: &[u8], durable: bool) -> StorageResult<()> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent)
			.await
			.map_err(|e| io_err(parent, e))?;
	}

	let tmp_path = sibling_temp_path(path);
	tokio::fs::write(&tmp_path, bytes)
		.await
		.map_err(|e| io_err(&tmp_path, e))?;

	fsync_file(&tmp_path).await?;

	tokio::fs::rename(&tmp_path, path)
		.await
		.map_err(|e| io_err(path, e))?;

	if durable
		&& let Some(parent) = path.parent()
	{
		fsync_dir(parent).await?;
	}

	Ok(())
}

/// Removes `path` if it exists, returning whether it was present.
pub async fn remove_if_exists(path: &Path) -> StorageResult<bool> {
	match tokio::fs::remove_file(path).await {
		Ok(()) => Ok(true),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
		Err(e) => Err(io_err(path, e)),
	}
}

async fn fsync_file(path: &Path) -> StorageResult<()> {
	let file = tokio::fs::File::open(path)
		.await
		.map_err(|e| io_err(path, e))?;
	file.sync_all().await.map_err(|e| io_err(path, e))
}

async fn fsync_dir(path: &Path) -> StorageResult<()> {
	// Directory fsync is a no-op on platforms without directory-fd support
	// (notably Windows); best-effort elsewhere.
	#[cfg(unix)]
	{
		let dir = tokio::fs::File::open(path)
			.await
			.map_err(|e| io_err(path, e))?;
		dir.sync_all().await.map_err(|e| io_err(path, e))?;
	}
	#[cfg(not(unix))]
	{
		let _ = path;
	}
	Ok(())
}

fn sibling_temp_path(path: &Path) -> PathBuf {
	let file_name = path
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();
	path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[tokio::test]
	async fn atomic_write_then_read_round_trips() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("a/b/c.json");

		atomic_write(&path, b"{\"x\":1}", true).await.unwrap();

		let read = tokio::fs::read(&path).await.unwrap();
		assert_eq!(read, b"{\"x\":1}");
	}

	#[tokio::test]
	async fn remove_missing_returns_false() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("missing.json");
		assert!(!remove_if_exists(&path).await.unwrap());
	}
}
