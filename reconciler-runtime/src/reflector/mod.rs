//! Caches objects in memory

mod object_ref;
pub mod store;

pub use self::object_ref::{ObjectRef, ObjectRefError};
use crate::watcher;
use async_stream::stream;
use futures::{Stream, StreamExt};
use reconciler_core::{Error, Resource};
pub use store::{store, Store};
use std::sync::Arc;

/// Read access to a locally replicated, possibly stale view of objects
///
/// The engine only ever reads through this; writes go to a
/// [`ResourceClient`](crate::ResourceClient).
pub trait Lister<K>: Send + Sync {
    /// Look up the cached copy of the object at `key`
    ///
    /// Absence is reported as a `NotFound` API error.
    fn get(&self, key: &ObjectRef) -> Result<Arc<K>, Error>;
}

/// Cache objects from a watch stream into a local [`Store`]
///
/// Observes the raw `Stream` of [`watcher::Event`] objects, and modifies the cache.
/// It passes the raw stream through unmodified.
///
/// The cache contains the last-seen state of objects,
/// which may lag slightly behind the actual state.
pub fn reflector<K, W>(mut writer: store::Writer<K>, stream: W) -> impl Stream<Item = W::Item>
where
    K: Resource + Clone + 'static,
    W: Stream<Item = watcher::Event<K>>,
{
    let mut stream = Box::pin(stream);
    stream! {
        while let Some(event) = stream.next().await {
            writer.apply_watcher_event(&event);
            yield event;
        }
    }
}
