//! Instance-scoped lazy state cache.
//!
//! Within one instance, a factory registered via [`InstanceState::create`]
//! is invoked at most once; every subsequent access returns the same value
//! until the instance is disposed.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;
use crate::instance::Instance;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Disposer = Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> BoxFuture + Send + Sync>;

struct Slot {
	value: Arc<dyn Any + Send + Sync>,
	dispose: Option<Disposer>,
}

/// Per-instance cache keyed by a stable scope key (typically the factory's
/// module path or a constant chosen by the caller).
#[derive(Default)]
pub struct InstanceState {
	slots: Mutex<HashMap<&'static str, Slot>>,
}

impl InstanceState {
	/// Resolves the value for `key`, running `init` the first time it is
	/// requested in this instance and caching the result under `key`.
	///
	/// `init` is synchronous by design: constructing the cached value must
	/// not itself depend on ambient context beyond what's already captured
	/// by the closure, keeping initialization order easy to reason about.
	pub fn get_or_init<T, F>(&self, key: &'static str, init: F, dispose: Option<Disposer>) -> Arc<T>
	where
		T: Send + Sync + 'static,
		F: FnOnce() -> T,
	{
		let mut slots = self.slots.lock();
		if let Some(existing) = slots.get(key) {
			return existing
				.value
				.clone()
				.downcast::<T>()
				.expect("scope key reused with a different type");
		}
		let value = Arc::new(init()) as Arc<dyn Any + Send + Sync>;
		slots.insert(
			key,
			Slot {
				value: value.clone(),
				dispose,
			},
		);
		value.downcast::<T>().expect("just inserted with this type")
	}

	/// Drains every registered disposer. Each disposer gets up to ten
	/// seconds before a warning is logged; it is still awaited to
	/// completion afterward rather than abandoned.
	pub(crate) async fn dispose_all(&self) {
		let slots = std::mem::take(&mut *self.slots.lock());
		let mut set = tokio::task::JoinSet::new();
		for (key, slot) in slots {
			let Some(dispose) = slot.dispose else { continue };
			let value = slot.value;
			set.spawn(async move {
				let fut = dispose(value);
				tokio::pin!(fut);
				if tokio::time::timeout(std::time::Duration::from_secs(10), &mut fut)
					.await
					.is_err()
				{
					tracing::warn!(key, "instance state disposer exceeded 10s, still waiting");
					fut.await;
				}
			});
		}
		while set.join_next().await.is_some() {}
	}
}

/// A handle bound to one `(key, init, dispose)` triple, resolved lazily
/// against whatever `Instance` is ambient when [`StateAccessor::get`] is
/// called.
pub struct StateAccessor<T> {
	key: &'static str,
	init: Arc<dyn Fn() -> T + Send + Sync>,
	dispose: Option<Disposer>,
}

impl<T: Send + Sync + 'static> StateAccessor<T> {
	/// Resolves the value, creating it via this accessor's factory the
	/// first time it is requested for the ambient instance.
	///
	/// # Panics
	/// Panics if called outside an [`crate::InstanceRegistry::provide`] scope —
	/// state without an owning instance has nowhere to be cached or disposed.
	pub fn get(&self) -> Arc<T> {
		let instance = Context::<Arc<Instance>>::get().expect("instance state accessed outside instance scope");
		let init = self.init.clone();
		instance
			.state()
			.get_or_init(self.key, move || (init)(), self.dispose.clone())
	}
}

impl InstanceState {
	/// Registers a factory for instance-scoped state under `key`. Returns an
	/// accessor that lazily creates and caches the value the first time
	/// it's resolved against an ambient instance.
	pub fn create<T, F, D, Fut>(key: &'static str, init: F, dispose: Option<D>) -> StateAccessor<T>
	where
		T: Send + Sync + 'static,
		F: Fn() -> T + Send + Sync + 'static,
		D: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let dispose: Option<Disposer> = dispose.map(|d| {
			let d = Arc::new(d);
			Arc::new(move |value: Arc<dyn Any + Send + Sync>| -> BoxFuture {
				let d = d.clone();
				let typed = value.downcast::<T>().expect("disposer type matches factory type");
				Box::pin(async move { d(typed).await })
			}) as Disposer
		});
		StateAccessor {
			key,
			init: Arc::new(init),
			dispose,
		}
	}
}
