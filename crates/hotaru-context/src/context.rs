//! Ambient context bound to the current logical task.
//!
//! `Context::<T>::provide` extends the calling task's ambient bindings with
//! `T` for the duration of a future; `Context::<T>::get` reads it back from
//! anywhere inside that future's call graph, including across `.await`
//! points. Binding does not leak into sibling tasks spawned with
//! `tokio::spawn` unless they explicitly capture it — it does not leak
//! across parallel unrelated tasks.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

tokio::task_local! {
	static AMBIENT: HashMap<TypeId, Arc<dyn Any + Send + Sync>>;
}

/// Raised when [`Context::get`] is called outside a matching `provide`
/// scope.
#[derive(Debug, thiserror::Error)]
#[error("no ambient context bound for {0}")]
pub struct ContextNotFound(pub &'static str);

/// Typed accessor for one ambient binding. Stateless — all state lives in
/// the task-local map; `Context<T>` is just a namespace for `T`'s
/// operations.
pub struct Context<T>(PhantomData<T>);

impl<T: Send + Sync + 'static> Context<T> {
	/// Runs `f` with `value` bound as the ambient `T` for its duration (and
	/// any nested `.await`s), preserving whatever other ambient bindings
	/// were already active.
	pub async fn provide<F, Fut, R>(value: T, f: F) -> R
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = R>,
	{
		let mut map = AMBIENT
			.try_with(Clone::clone)
			.unwrap_or_default();
		map.insert(TypeId::of::<T>(), Arc::new(value) as Arc<dyn Any + Send + Sync>);
		AMBIENT.scope(map, f()).await
	}

	/// Reads the ambient `T`, if one is bound in the current task.
	#[must_use]
	pub fn try_get() -> Option<Arc<T>> {
		AMBIENT
			.try_with(|map| map.get(&TypeId::of::<T>()).cloned())
			.ok()
			.flatten()
			.and_then(|value| value.downcast::<T>().ok())
	}

	/// Reads the ambient `T`, failing with [`ContextNotFound`] if none is
	/// bound.
	pub fn get() -> Result<Arc<T>, ContextNotFound> {
		Self::try_get().ok_or(ContextNotFound(std::any::type_name::<T>()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn get_outside_scope_fails() {
		assert!(Context::<u32>::try_get().is_none());
	}

	#[tokio::test]
	async fn provide_binds_for_duration_of_future() {
		let result = Context::<u32>::provide(42, || async {
			Context::<u32>::get().map(|v| *v)
		})
		.await
		.unwrap();
		assert_eq!(result, 42);

		// The binding does not escape the `provide` call.
		assert!(Context::<u32>::try_get().is_none());
	}

	#[tokio::test]
	async fn nested_provide_preserves_outer_bindings() {
		Context::<u32>::provide(1u32, || async {
			Context::<&'static str>::provide("inner", || async {
				assert_eq!(*Context::<u32>::get().unwrap(), 1);
				assert_eq!(*Context::<&'static str>::get().unwrap(), "inner");
			})
			.await;

			// Inner binding is gone once its scope ends; outer remains.
			assert!(Context::<&'static str>::try_get().is_none());
			assert_eq!(*Context::<u32>::get().unwrap(), 1);
		})
		.await;
	}

	#[tokio::test]
	async fn spawned_sibling_tasks_do_not_inherit_binding() {
		Context::<u32>::provide(7u32, || async {
			let joined = tokio::spawn(async { Context::<u32>::try_get() })
				.await
				.unwrap();
			assert!(joined.is_none());
		})
		.await;
	}
}
