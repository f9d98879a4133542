//! Atomic key-addressed persistence with transactional multi-key writes.
//!
//! Backs sessions, messages, parts, and permission approvals.

mod error;
mod fs_util;
mod key;
mod locks;
mod tx;

pub use error::{StorageError, StorageResult};
pub use key::Key;
pub use tx::TxOp;

use std::path::{Path, PathBuf};

use locks::LockTable;
use tx::TxPaths;

/// A persistent mapping from hierarchical keys to JSON values, durable
/// under `<root>/storage/`.
pub struct Storage {
	root: PathBuf,
	locks: LockTable,
	tx: TxPaths,
}

impl Storage {
	/// Opens (creating if absent) the storage tree rooted at `root`,
	/// running transaction-log recovery before returning.
	pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
		let root = root.into();
		tokio::fs::create_dir_all(root.join("storage"))
			.await
			.map_err(|e| StorageError::Io {
				path: root.clone(),
				source: e,
			})?;

		let storage = Self {
			locks: LockTable::new(),
			tx: TxPaths::new(root.clone()),
			root,
		};

		storage
			.tx
			.recover(|key| storage.key_path(key))
			.await?;

		Ok(storage)
	}

	fn key_path(&self, key: &Key) -> PathBuf {
		self.root.join("storage").join(key.to_relative_path())
	}

	/// Reads the value stored at `key`, failing with `NotFound` if absent.
	pub async fn read(&self, key: &Key) -> StorageResult<serde_json::Value> {
		let _guard = self.locks.read(key).await;
		self.read_uncontended(key).await
	}

	async fn read_uncontended(&self, key: &Key) -> StorageResult<serde_json::Value> {
		let path = self.key_path(key);
		match tokio::fs::read(&path).await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(StorageError::NotFound(key.clone()))
			}
			Err(e) => Err(StorageError::Io { path, source: e }),
		}
	}

	/// Writes `value` at `key`. Atomic: the prior value remains observable
	/// until the new one is fully durable.
	pub async fn write(&self, key: &Key, value: serde_json::Value) -> StorageResult<()> {
		let _guard = self.locks.write(key).await;
		let bytes = serde_json::to_vec_pretty(&value)?;
		fs_util::atomic_write(&self.key_path(key), &bytes, key.is_durable()).await
	}

	/// Removes `key`. Returns whether a value was present.
	pub async fn remove(&self, key: &Key) -> StorageResult<bool> {
		let _guard = self.locks.write(key).await;
		fs_util::remove_if_exists(&self.key_path(key)).await
	}

	/// Applies `mutator` to the current value at `key` (or `None` if
	/// absent) and writes the result, as one serialised critical section —
	/// no other `read`/`write`/`update` on this key interleaves.
	pub async fn update<F, E>(&self, key: &Key, mutator: F) -> Result<(), E>
	where
		F: FnOnce(Option<serde_json::Value>) -> Result<serde_json::Value, E>,
		E: From<StorageError>,
	{
		let _guard = self.locks.write(key).await;

		let current = match self.read_uncontended(key).await {
			Ok(v) => Some(v),
			Err(StorageError::NotFound(_)) => None,
			Err(e) => return Err(e.into()),
		};

		let next = mutator(current)?;
		let bytes = serde_json::to_vec_pretty(&next).map_err(StorageError::from)?;
		fs_util::atomic_write(&self.key_path(key), &bytes, key.is_durable())
			.await
			.map_err(Into::into)
	}

	/// Lists every key whose tuple has `prefix`, in lexicographic order.
	pub async fn list(&self, prefix: &Key) -> StorageResult<Vec<Key>> {
		let mut root = self.root.join("storage");
		for seg in prefix.segments() {
			root.push(seg);
		}

		let mut keys = Vec::new();
		walk(&root, prefix.segments().to_vec(), &mut keys).await?;
		keys.sort();
		Ok(keys)
	}

	/// Applies every op in `ops` atomically: either all are applied, or
	/// none are observable. An interrupted transaction is recovered on the
	/// next `Storage::open`.
	pub async fn transaction(&self, ops: Vec<TxOp>) -> StorageResult<()> {
		if ops.is_empty() {
			return Ok(());
		}

		let keys: Vec<Key> = ops.iter().map(|op| op.key().clone()).collect();
		let _guards = self.locks.write_many(&keys).await;

		self.tx.run(|key| self.key_path(key), ops).await
	}
}

fn walk<'a>(
	dir: &'a Path,
	prefix: Vec<String>,
	out: &'a mut Vec<Key>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = StorageResult<()>> + Send + 'a>> {
	Box::pin(async move {
		let mut entries = match tokio::fs::read_dir(dir).await {
			Ok(e) => e,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(e) => {
				return Err(StorageError::Io {
					path: dir.to_path_buf(),
					source: e,
				});
			}
		};

		while let Some(entry) = entries.next_entry().await.map_err(|e| StorageError::Io {
			path: dir.to_path_buf(),
			source: e,
		})? {
			let path = entry.path();
			let name = entry.file_name().to_string_lossy().into_owned();

			if path.is_dir() {
				let mut child_prefix = prefix.clone();
				child_prefix.push(name);
				walk(&path, child_prefix, out).await?;
			} else if let Some(stem) = name.strip_suffix(".json") {
				let mut segments = prefix.clone();
				segments.push(stem.to_string());
				out.push(Key::new(segments));
			}
		}
		Ok(())
	})
}
