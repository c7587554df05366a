//! Read and write handles to the lister cache
use super::{Lister, ObjectRef};
use crate::watcher;
use ahash::AHashMap;
use parking_lot::RwLock;
use reconciler_core::{Error, ErrorResponse, Resource};
use std::{fmt::Debug, sync::Arc};

type Cache<K> = Arc<RwLock<AHashMap<ObjectRef, Arc<K>>>>;

/// A writable Store handle
///
/// This is exclusive since it's not safe to share a single `Store` between multiple reflectors.
/// In particular, `Restarted` events will clobber the state of other connected reflectors.
#[derive(Debug)]
pub struct Writer<K: 'static> {
    store: Cache<K>,
}

impl<K: 'static> Default for Writer<K> {
    fn default() -> Self {
        Self {
            store: Cache::default(),
        }
    }
}

impl<K: 'static + Resource + Clone> Writer<K> {
    /// Return a read handle to the store
    ///
    /// Multiple read handles may be obtained, by either calling `as_reader` multiple times,
    /// or by calling `Store::clone()` afterwards.
    #[must_use]
    pub fn as_reader(&self) -> Store<K> {
        Store {
            store: self.store.clone(),
        }
    }

    /// Applies a single watcher event to the store
    pub fn apply_watcher_event(&mut self, event: &watcher::Event<K>) {
        match event {
            watcher::Event::Applied(obj) => {
                let key = ObjectRef::from_obj(obj);
                self.store.write().insert(key, Arc::new(obj.clone()));
            }
            watcher::Event::Deleted(obj) => {
                self.store.write().remove(&ObjectRef::from_obj(obj));
            }
            watcher::Event::Restarted(new_objs) => {
                let new_objs = new_objs
                    .iter()
                    .map(|obj| (ObjectRef::from_obj(obj), Arc::new(obj.clone())))
                    .collect::<AHashMap<_, _>>();
                *self.store.write() = new_objs;
            }
        }
    }
}

/// A readable cache of objects of kind `K`
///
/// Cloning will produce a new reference to the same backing store.
///
/// Cannot be constructed directly since one writer handle is required,
/// use `Writer::as_reader()` instead.
#[derive(Debug)]
pub struct Store<K: 'static> {
    store: Cache<K>,
}

impl<K: 'static> Clone for Store<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K: 'static + Resource> Store<K> {
    /// Retrieve the entry referred to by `key`, if it is in the cache.
    ///
    /// `key.namespace` is ignored for cluster-scoped resources.
    ///
    /// Note that this is a cache and may be stale. Deleted objects may still exist in the cache
    /// despite having been deleted in the store, and new objects may not yet exist in the cache.
    #[must_use]
    pub fn get(&self, key: &ObjectRef) -> Option<Arc<K>> {
        let store = self.store.read();
        store
            .get(key)
            // Try to erase the namespace and try again, in case the object is cluster-scoped
            .or_else(|| {
                store.get(&{
                    let mut cluster_key = key.clone();
                    cluster_key.namespace = None;
                    cluster_key
                })
            })
            .cloned()
    }

    /// Return a full snapshot of the current values
    #[must_use]
    pub fn state(&self) -> Vec<Arc<K>> {
        self.store.read().values().cloned().collect()
    }

    /// Number of cached objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

impl<K: 'static + Resource + Send + Sync> Lister<K> for Store<K> {
    fn get(&self, key: &ObjectRef) -> Result<Arc<K>, Error> {
        Store::get(self, key).ok_or_else(|| ErrorResponse::not_found(K::PLURAL, &key.name).into())
    }
}

/// Create a (Reader, Writer) for a `Store<K>` for a typed resource `K`
///
/// The `Writer` should be passed to a [`reflector`](crate::reflector()),
/// and the [`Store`] is a read-only handle.
#[must_use]
pub fn store<K: 'static + Resource + Clone>() -> (Store<K>, Writer<K>) {
    let w = Writer::<K>::default();
    let r = w.as_reader();
    (r, w)
}
