//! Per-directory instance scope.
//!
//! An `Instance` is the unit of "which project/worktree am I operating in"
//! — resolved once per directory and shared by every concurrent caller that
//! asks for it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotaru_bus::Bus;
use tokio::sync::{Mutex, OnceCell};

use crate::context::Context;
use crate::state::InstanceState;

/// One resolved project scope: a working directory, the worktree root it
/// belongs to (nearest ancestor containing `.git`, or `/` if none), and a
/// stable identifier derived from the repository's first commit.
pub struct Instance {
	directory: PathBuf,
	worktree: PathBuf,
	project_id: String,
	state: InstanceState,
	bus: Bus,
}

impl Instance {
	/// The directory this instance was resolved for.
	#[must_use]
	pub fn directory(&self) -> &Path {
		&self.directory
	}

	/// The worktree root (nearest ancestor containing `.git`), or `/` if
	/// `directory` is not inside a git repository.
	#[must_use]
	pub fn worktree(&self) -> &Path {
		&self.worktree
	}

	/// A stable id for the project: the repository's first commit hash, or
	/// `"global"` outside a git repository.
	#[must_use]
	pub fn project_id(&self) -> &str {
		&self.project_id
	}

	/// The instance's lazy state cache.
	#[must_use]
	pub fn state(&self) -> &InstanceState {
		&self.state
	}

	/// The instance-scoped event bus.
	#[must_use]
	pub fn bus(&self) -> &Bus {
		&self.bus
	}

	async fn discover(directory: PathBuf) -> Self {
		let worktree = find_worktree_root(&directory)
			.await
			.unwrap_or_else(|| PathBuf::from("/"));
		let project_id = first_commit_hash(&worktree)
			.await
			.unwrap_or_else(|| "global".to_string());

		Self {
			directory,
			worktree,
			project_id,
			state: InstanceState::default(),
			bus: Bus::new(),
		}
	}

	/// Runs every registered disposer for this instance's state, then
	/// publishes `instance.disposed`.
	pub async fn dispose(&self) {
		self.state.dispose_all().await;
		let def = self.bus.define::<InstanceDisposed>();
		let _ = self
			.bus
			.publish(
				&def,
				InstanceDisposed {
					project_id: self.project_id.clone(),
				},
			)
			.await;
	}
}

/// Published on `Instance::bus()` once disposal completes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InstanceDisposed {
	/// The disposed instance's project id.
	pub project_id: String,
}

async fn find_worktree_root(start: &Path) -> Option<PathBuf> {
	let mut current = start.to_path_buf();
	loop {
		if tokio::fs::metadata(current.join(".git")).await.is_ok() {
			return Some(current);
		}
		if !current.pop() {
			return None;
		}
	}
}

async fn first_commit_hash(worktree: &Path) -> Option<String> {
	let output = tokio::process::Command::new("git")
		.arg("rev-list")
		.arg("--max-parents=0")
		.arg("HEAD")
		.current_dir(worktree)
		.output()
		.await
		.ok()?;
	if !output.status.success() {
		return None;
	}
	String::from_utf8(output.stdout)
		.ok()
		.map(|s| s.lines().last().unwrap_or_default().trim().to_string())
		.filter(|s| !s.is_empty())
}

/// Resolves and shares [`Instance`]s by directory. Concurrent callers asking
/// for the same directory before it has finished resolving all await the
/// same in-flight resolution rather than racing to create duplicates.
#[derive(Default)]
pub struct InstanceRegistry {
	slots: Mutex<std::collections::HashMap<PathBuf, Arc<OnceCell<Arc<Instance>>>>>,
}

impl InstanceRegistry {
	/// Creates an empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Resolves the `Instance` for `directory` (creating it on first use via
	/// `init`, which runs exactly once per directory), then runs `f` with
	/// that instance bound as the ambient [`Context`].
	pub async fn provide<Init, InitFut, F, Fut, R>(&self, directory: &Path, init: Init, f: F) -> R
	where
		Init: FnOnce() -> InitFut,
		InitFut: Future<Output = ()>,
		F: FnOnce() -> Fut,
		Fut: Future<Output = R>,
	{
		let directory = directory.to_path_buf();
		let cell = {
			let mut slots = self.slots.lock().await;
			slots
				.entry(directory.clone())
				.or_insert_with(|| Arc::new(OnceCell::new()))
				.clone()
		};

		let instance = cell
			.get_or_init(|| async {
				init().await;
				Arc::new(Instance::discover(directory).await)
			})
			.await
			.clone();

		Context::<Arc<Instance>>::provide(instance, f).await
	}

	/// Disposes and forgets the instance resolved for `directory`, if any.
	pub async fn dispose(&self, directory: &Path) {
		let cell = self.slots.lock().await.remove(directory);
		if let Some(cell) = cell
			&& let Some(instance) = cell.get()
		{
			instance.dispose().await;
		}
	}

	/// Disposes every live instance. Used as the last step of runtime
	/// shutdown.
	pub async fn dispose_all(&self) {
		let slots = std::mem::take(&mut *self.slots.lock().await);
		for (_, cell) in slots {
			if let Some(instance) = cell.get() {
				instance.dispose().await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn concurrent_provide_for_same_directory_resolves_once() {
		let registry = Arc::new(InstanceRegistry::new());
		let dir = tempfile::tempdir().unwrap();
		let init_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

		let mut handles = Vec::new();
		for _ in 0..8 {
			let registry = registry.clone();
			let path = dir.path().to_path_buf();
			let init_calls = init_calls.clone();
			handles.push(tokio::spawn(async move {
				registry
					.provide(
						&path,
						|| {
							let init_calls = init_calls.clone();
							async move {
								init_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
							}
						},
						|| async { Context::<Arc<Instance>>::get().unwrap().project_id().to_string() },
					)
					.await
			}));
		}

		let mut ids = Vec::new();
		for handle in handles {
			ids.push(handle.await.unwrap());
		}
		assert!(ids.iter().all(|id| id == &ids[0]));
		assert_eq!(init_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn directory_outside_git_repo_gets_global_project_id() {
		let registry = InstanceRegistry::new();
		let dir = tempfile::tempdir().unwrap();

		let project_id = registry
			.provide(
				dir.path(),
				|| async {},
				|| async { Context::<Arc<Instance>>::get().unwrap().project_id().to_string() },
			)
			.await;

		// Only assert "global" if the temp dir truly isn't under a repo the
		// test runner happens to nest it in.
		if find_worktree_root(dir.path()).await.is_none() {
			assert_eq!(project_id, "global");
		}
	}

	#[tokio::test]
	async fn dispose_runs_state_disposers_and_publishes_event() {
		let registry = InstanceRegistry::new();
		let dir = tempfile::tempdir().unwrap();

		registry
			.provide(dir.path(), || async {}, || async {
				let instance = Context::<Arc<Instance>>::get().unwrap();
				let def = instance.bus().define::<InstanceDisposed>();
				let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
				let seen2 = seen.clone();
				instance.bus().subscribe(&def, move |_: InstanceDisposed| {
					let seen = seen2.clone();
					async move {
						seen.store(true, std::sync::atomic::Ordering::SeqCst);
					}
				});
				instance.dispose().await;
				assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
			})
			.await;
	}

	#[tokio::test]
	async fn dispose_all_tears_down_every_live_instance() {
		let registry = InstanceRegistry::new();
		let dir_a = tempfile::tempdir().unwrap();
		let dir_b = tempfile::tempdir().unwrap();
		let disposed = Arc::new(std::sync::atomic::AtomicUsize::new(0));

		for dir in [dir_a.path(), dir_b.path()] {
			let disposed = disposed.clone();
			registry
				.provide(dir, || async {}, || async move {
					let instance = Context::<Arc<Instance>>::get().unwrap();
					let def = instance.bus().define::<InstanceDisposed>();
					instance.bus().subscribe(&def, move |_: InstanceDisposed| {
						let disposed = disposed.clone();
						async move {
							disposed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
						}
					});
				})
				.await;
		}

		registry.dispose_all().await;
		assert_eq!(disposed.load(std::sync::atomic::Ordering::SeqCst), 2);
	}
}
