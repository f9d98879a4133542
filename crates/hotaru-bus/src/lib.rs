//! Typed publish/subscribe event bus.
//!
//! Events are `(type, properties)` pairs; a type's
//! "schema" is its `Serialize`/`DeserializeOwned` shape — publishing
//! validates by round-tripping through `serde_json`, and a malformed
//! payload at that boundary is a programmer error (`BusError::Encode`).

use std::any::type_name;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors surfaced by the bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
	/// Properties failed to encode or decode against the event's shape.
	#[error("event payload does not match schema for {event}: {source}")]
	Encode {
		/// The event type name involved.
		event: &'static str,
		/// Underlying (de)serialization error.
		#[source]
		source: serde_json::Error,
	},
}

/// A future a subscriber callback returns; awaited to completion before
/// `publish` returns.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A typed, named event. Construct once via [`Bus::define`] and reuse it as
/// the handle for `publish`/`subscribe`/`once`.
#[derive(Debug, Clone, Copy)]
pub struct EventDefinition<T> {
	name: &'static str,
	_marker: PhantomData<fn() -> T>,
}

impl<T> EventDefinition<T> {
	/// The event's registered type name.
	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}
}

type Callback = Arc<dyn Fn(serde_json::Value) -> BoxFuture + Send + Sync>;

struct Subscription {
	id: u64,
	/// `None` means a `subscribe_all` (wildcard) subscriber.
	event_name: Option<&'static str>,
	callback: Callback,
}

struct Inner {
	next_id: AtomicU64,
	subs: Mutex<Vec<Subscription>>,
}

/// A process-wide (or instance-scoped, via [`hotaru_context`]) typed event
/// bus.
#[derive(Clone)]
pub struct Bus {
	inner: Arc<Inner>,
}

impl Default for Bus {
	fn default() -> Self {
		Self::new()
	}
}

impl Bus {
	/// Creates an empty bus.
	#[must_use]
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				next_id: AtomicU64::new(1),
				subs: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Registers an event type, identified by `T`'s type name. Calling this
	/// repeatedly for the same `T` is cheap and yields an equivalent handle.
	#[must_use]
	pub fn define<T>(&self) -> EventDefinition<T> {
		EventDefinition {
			name: type_name::<T>(),
			_marker: PhantomData,
		}
	}

	/// Publishes `props` under `def`. Dispatches to every matching
	/// subscriber — typed subscribers for this event, then `"*"`
	/// subscribers — in the order they subscribed, awaiting each before
	/// moving to the next. A subscriber that fails to deserialize the
	/// payload is logged and skipped; it never fails the publisher.
	pub async fn publish<T>(&self, def: &EventDefinition<T>, props: T) -> Result<(), BusError>
	where
		T: Serialize,
	{
		let value = serde_json::to_value(&props).map_err(|source| BusError::Encode {
			event: def.name,
			source,
		})?;

		let matching: Vec<Callback> = {
			let subs = self.inner.subs.lock();
			subs.iter()
				.filter(|s| s.event_name.is_none() || s.event_name == Some(def.name))
				.map(|s| s.callback.clone())
				.collect()
		};

		for callback in matching {
			callback(value.clone()).await;
		}

		Ok(())
	}

	/// Subscribes to `def`. The callback receives the event already decoded
	/// as `T`; a payload that fails to decode is logged and dropped rather
	/// than delivered.
	pub fn subscribe<T, F, Fut>(&self, def: &EventDefinition<T>, callback: F) -> Unsubscribe
	where
		T: DeserializeOwned + Send + 'static,
		F: Fn(T) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let event_name = def.name;
		let wrapped = move |value: serde_json::Value| -> BoxFuture {
			match serde_json::from_value::<T>(value) {
				Ok(typed) => Box::pin(callback(typed)),
				Err(error) => {
					tracing::warn!(event = event_name, %error, "bus: subscriber payload decode failed");
					Box::pin(async {})
				}
			}
		};
		self.register(Some(event_name), Arc::new(wrapped))
	}

	/// Subscribes to every event published on this bus, receiving the
	/// type-erased JSON payload. Only sees events published *after* this
	/// call; there is no replay of events published before subscribing.
	pub fn subscribe_all<F, Fut>(&self, callback: F) -> Unsubscribe
	where
		F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let wrapped = move |value: serde_json::Value| -> BoxFuture { Box::pin(callback(value)) };
		self.register(None, Arc::new(wrapped))
	}

	/// Subscribes to `def` for exactly one delivery, then automatically
	/// unsubscribes.
	pub fn once<T, F, Fut>(&self, def: &EventDefinition<T>, callback: F) -> Unsubscribe
	where
		T: DeserializeOwned + Send + 'static,
		F: Fn(T) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		let event_name = def.name;
		let bus = Arc::downgrade(&self.inner);

		let wrapped = move |value: serde_json::Value| -> BoxFuture {
			let bus = bus.clone();
			match serde_json::from_value::<T>(value) {
				Ok(typed) => {
					let fut = callback(typed);
					Box::pin(async move {
						fut.await;
						if let Some(inner) = bus.upgrade() {
							remove(&inner, id);
						}
					})
				}
				Err(error) => {
					tracing::warn!(event = event_name, %error, "bus: once subscriber payload decode failed");
					if let Some(inner) = bus.upgrade() {
						remove(&inner, id);
					}
					Box::pin(async {})
				}
			}
		};

		self.inner.subs.lock().push(Subscription {
			id,
			event_name: Some(event_name),
			callback: Arc::new(wrapped),
		});

		Unsubscribe {
			inner: Arc::downgrade(&self.inner),
			id,
		}
	}

	fn register(&self, event_name: Option<&'static str>, callback: Callback) -> Unsubscribe {
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		self.inner.subs.lock().push(Subscription {
			id,
			event_name,
			callback,
		});
		Unsubscribe {
			inner: Arc::downgrade(&self.inner),
			id,
		}
	}
}

fn remove(inner: &Inner, id: u64) {
	inner.subs.lock().retain(|s| s.id != id);
}

/// A handle returned by `subscribe`/`subscribe_all`/`once`. Dropping it does
/// not unsubscribe; call [`Unsubscribe::unsubscribe`] explicitly.
pub struct Unsubscribe {
	inner: Weak<Inner>,
	id: u64,
}

impl Unsubscribe {
	/// Removes this subscription. O(n) in subscriber count; calling it more
	/// than once (or after the bus was dropped) is a no-op.
	pub fn unsubscribe(&self) {
		if let Some(inner) = self.inner.upgrade() {
			remove(&inner, self.id);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicUsize;
	use tokio::sync::Mutex as AsyncMutex;

	#[derive(Debug, Clone, Serialize, serde::Deserialize)]
	struct Pinged {
		n: u32,
	}

	#[tokio::test]
	async fn subscribers_see_events_in_registration_order() {
		let bus = Bus::new();
		let def = bus.define::<Pinged>();
		let order = Arc::new(AsyncMutex::new(Vec::new()));

		for tag in ["first", "second", "third"] {
			let order = order.clone();
			bus.subscribe(&def, move |_: Pinged| {
				let order = order.clone();
				async move { order.lock().await.push(tag) }
			});
		}

		bus.publish(&def, Pinged { n: 1 }).await.unwrap();
		assert_eq!(*order.lock().await, vec!["first", "second", "third"]);
	}

	#[tokio::test]
	async fn subscribe_all_receives_type_erased_payload() {
		let bus = Bus::new();
		let def = bus.define::<Pinged>();
		let seen = Arc::new(AtomicUsize::new(0));

		let seen2 = seen.clone();
		bus.subscribe_all(move |value: serde_json::Value| {
			let seen = seen2.clone();
			async move {
				assert_eq!(value["n"], 1);
				seen.fetch_add(1, Ordering::SeqCst);
			}
		});

		bus.publish(&def, Pinged { n: 1 }).await.unwrap();
		assert_eq!(seen.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn subscribe_all_does_not_see_events_published_before_it() {
		let bus = Bus::new();
		let def = bus.define::<Pinged>();
		bus.publish(&def, Pinged { n: 0 }).await.unwrap();

		let seen = Arc::new(AtomicUsize::new(0));
		let seen2 = seen.clone();
		bus.subscribe_all(move |_| {
			let seen = seen2.clone();
			async move {
				seen.fetch_add(1, Ordering::SeqCst);
			}
		});

		bus.publish(&def, Pinged { n: 1 }).await.unwrap();
		assert_eq!(seen.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn once_fires_exactly_once() {
		let bus = Bus::new();
		let def = bus.define::<Pinged>();
		let count = Arc::new(AtomicUsize::new(0));

		let count2 = count.clone();
		bus.once(&def, move |_: Pinged| {
			let count = count2.clone();
			async move {
				count.fetch_add(1, Ordering::SeqCst);
			}
		});

		bus.publish(&def, Pinged { n: 1 }).await.unwrap();
		bus.publish(&def, Pinged { n: 2 }).await.unwrap();
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn unsubscribe_is_idempotent() {
		let bus = Bus::new();
		let def = bus.define::<Pinged>();
		let count = Arc::new(AtomicUsize::new(0));

		let count2 = count.clone();
		let unsub = bus.subscribe(&def, move |_: Pinged| {
			let count = count2.clone();
			async move {
				count.fetch_add(1, Ordering::SeqCst);
			}
		});

		unsub.unsubscribe();
		unsub.unsubscribe();

		bus.publish(&def, Pinged { n: 1 }).await.unwrap();
		assert_eq!(count.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn subscribe_all_decode_failure_does_not_block_other_subscribers() {
		let bus = Bus::new();
		let def = bus.define::<Pinged>();
		let called = Arc::new(AtomicUsize::new(0));

		// A `subscribe_all` handler that tries to decode into a shape the
		// payload doesn't have fails to deserialize; that failure is local
		// to this handler and must not stop the typed subscriber below.
		bus.subscribe_all(|value: serde_json::Value| async move {
			#[derive(serde::Deserialize)]
			struct WrongShape {
				#[allow(dead_code)]
				totally_different_field: String,
			}
			if let Err(error) = serde_json::from_value::<WrongShape>(value) {
				tracing::debug!(%error, "expected decode failure in test");
			}
		});

		let called2 = called.clone();
		bus.subscribe(&def, move |_: Pinged| {
			let called = called2.clone();
			async move {
				called.fetch_add(1, Ordering::SeqCst);
			}
		});

		bus.publish(&def, Pinged { n: 7 }).await.unwrap();
		assert_eq!(called.load(Ordering::SeqCst), 1);
	}
}
