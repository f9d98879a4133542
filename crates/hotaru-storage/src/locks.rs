//! Per-key reader-writer lock table.
//!
//! Many readers or one writer per key. `tokio::sync::RwLock` serves waiters
//! in arrival order, which is enough to avoid writer starvation without a
//! bespoke queue. Multi-key transactions acquire write guards in
//! lexicographically sorted key order so two overlapping transactions can
//! never deadlock against each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};

use crate::key::Key;

/// Registry of per-key locks, created lazily on first access.
#[derive(Debug, Default)]
pub struct LockTable {
	locks: Mutex<HashMap<Key, Arc<RwLock<()>>>>,
}

impl LockTable {
	/// Creates an empty lock table.
	pub fn new() -> Self {
		Self::default()
	}

	async fn lock_for(&self, key: &Key) -> Arc<RwLock<()>> {
		let mut table = self.locks.lock().await;
		table.entry(key.clone()).or_default().clone()
	}

	/// Acquires a read guard for `key`. Held only for the caller's scope.
	pub async fn read(&self, key: &Key) -> OwnedRwLockReadGuard {
		let lock = self.lock_for(key).await;
		OwnedRwLockReadGuard(lock.clone().read_owned().await, lock)
	}

	/// Acquires a write guard for `key`.
	pub async fn write(&self, key: &Key) -> OwnedRwLockWriteGuard<()> {
		let lock = self.lock_for(key).await;
		lock.write_owned().await
	}

	/// Acquires write guards for every key in `keys`, in sorted order, so
	/// that concurrent transactions with overlapping key sets never form a
	/// lock-acquisition cycle.
	pub async fn write_many(&self, keys: &[Key]) -> Vec<OwnedRwLockWriteGuard<()>> {
		let mut sorted: Vec<&Key> = keys.iter().collect();
		sorted.sort();
		sorted.dedup();

		let mut guards = Vec::with_capacity(sorted.len());
		for key in sorted {
			guards.push(self.write(key).await);
		}
		guards
	}
}

/// Owned read guard that keeps the backing `Arc<RwLock<()>>` alive for the
/// guard's lifetime (the table entry may otherwise be evicted concurrently).
pub struct OwnedRwLockReadGuard(tokio::sync::OwnedRwLockReadGuard<()>, Arc<RwLock<()>>);

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn write_many_acquires_then_releases_in_sorted_order() {
		let table = LockTable::new();
		let a = Key::new(["a"]);
		let b = Key::new(["b"]);

		// Requesting in reverse order must not change acquisition order;
		// dropping releases both locks for the next caller.
		let guards = table.write_many(&[b.clone(), a.clone()]);
		drop(guards.await);

		let guards = table.write_many(&[a, b]);
		drop(guards.await);
	}

	#[tokio::test]
	async fn concurrent_reads_do_not_block_each_other() {
		let table = LockTable::new();
		let key = Key::new(["x"]);
		let _r1 = table.read(&key).await;
		let _r2 = table.read(&key).await;
	}
}
