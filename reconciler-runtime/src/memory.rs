//! An in-memory store with optimistic concurrency
//!
//! [`MemoryStore`] behaves like a small declarative API server for one kind: every
//! write bumps a store-wide `resourceVersion`, writes carrying a stale version are
//! rejected with a conflict, and deletion of an object with finalizers only marks it.
//! It backs the tests and demos, and doubles as a reference for implementing
//! [`ResourceClient`] against a real store.
use crate::{
    client::ResourceClient,
    events::{NewEvent, Recorder},
    reflector::ObjectRef,
    watcher,
};
use async_broadcast::{InactiveReceiver, Sender};
use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, Stream, StreamExt};
use hashbrown::HashMap;
use parking_lot::Mutex;
use reconciler_core::{
    Error, ErrorResponse, HasSpec, HasStatus, ObjectReference, Patch, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};
use tracing::trace;

const WATCH_BUFFER: usize = 1024;

/// The kind of request recorded by [`MemoryStore::calls`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    /// [`ResourceClient::get`]
    Get,
    /// [`ResourceClient::update_status`]
    UpdateStatus,
    /// [`ResourceClient::patch`]
    Patch,
}

/// A request made through the [`ResourceClient`] interface
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// What was requested
    pub verb: Verb,
    /// The object it was made against
    pub key: ObjectRef,
    /// The patch body, or the status for status updates
    pub body: Option<serde_json::Value>,
}

struct State<K> {
    objects: BTreeMap<ObjectRef, K>,
    version: u64,
    calls: Vec<Call>,
    faults: HashMap<Verb, VecDeque<Error>>,
}

impl<K> State<K> {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// An in-memory, watchable store of objects of kind `K`
///
/// Cloning produces another handle to the same store.
pub struct MemoryStore<K> {
    state: Arc<Mutex<State<K>>>,
    events: Sender<watcher::Event<K>>,
    _events_rx: InactiveReceiver<watcher::Event<K>>,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            events: self.events.clone(),
            _events_rx: self._events_rx.clone(),
        }
    }
}

impl<K> Default for MemoryStore<K>
where
    K: Resource + HasSpec + HasStatus + Clone + Serialize + DeserializeOwned,
    K::Spec: PartialEq,
    K::Status: Clone + Serialize,
{
    fn default() -> Self {
        Self::new()
    }
}

fn key_of<K: Resource>(obj: &K) -> ObjectRef {
    ObjectRef::from_obj(obj)
}

fn key(namespace: Option<&str>, name: &str) -> ObjectRef {
    ObjectRef {
        namespace: namespace.map(String::from),
        name: name.to_string(),
    }
}

fn check_version<K: Resource>(incoming: &K, stored: &K) -> Result<(), Error> {
    match incoming.resource_version() {
        Some(rv) if Some(&rv) != stored.meta().resource_version.as_ref() => {
            Err(ErrorResponse::conflict(K::PLURAL, &stored.name_any()).into())
        }
        _ => Ok(()),
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + HasSpec + HasStatus + Clone + Serialize + DeserializeOwned,
    K::Spec: PartialEq,
    K::Status: Clone + Serialize,
{
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        let (mut events, events_rx) = async_broadcast::broadcast(WATCH_BUFFER);
        events.set_overflow(true);
        events.set_await_active(false);
        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                version: 0,
                calls: Vec::new(),
                faults: HashMap::new(),
            })),
            events,
            _events_rx: events_rx.deactivate(),
        }
    }

    fn notify(&self, event: watcher::Event<K>) {
        // nobody watching is fine, slow watchers lose the oldest events
        let _ = self.events.try_broadcast(event);
    }

    /// Store a new object
    ///
    /// Server-owned metadata (`uid`, `generation`, `resourceVersion`,
    /// `deletionTimestamp`) is assigned by the store.
    pub fn create(&self, mut obj: K) -> Result<K, Error> {
        let mut state = self.state.lock();
        let key = key_of(&obj);
        if key.name.is_empty() {
            return Err(ErrorResponse::new(
                reconciler_core::response::reason::INVALID,
                422,
                format!("{}: metadata.name is required", K::PLURAL),
            )
            .into());
        }
        if state.objects.contains_key(&key) {
            return Err(ErrorResponse::already_exists(K::PLURAL, &key.name).into());
        }
        let version = state.next_version();
        let meta = obj.meta_mut();
        meta.uid = Some(format!("uid-{version}"));
        meta.generation = Some(1);
        meta.resource_version = Some(version);
        meta.deletion_timestamp = None;
        state.objects.insert(key, obj.clone());
        self.notify(watcher::Event::Applied(obj.clone()));
        Ok(obj)
    }

    /// Replace the user-owned parts of an object, as a user editing it would
    ///
    /// The stored status is kept. `generation` is bumped when the spec changes.
    /// If `obj` carries a `resourceVersion` it must match the stored one.
    pub fn update(&self, mut obj: K) -> Result<K, Error> {
        let mut state = self.state.lock();
        let key = key_of(&obj);
        let stored = state
            .objects
            .get(&key)
            .ok_or_else(|| ErrorResponse::not_found(K::PLURAL, &key.name))?;
        check_version(&obj, stored)?;
        let generation = stored.generation() + i64::from(stored.spec() != obj.spec());
        let uid = stored.uid();
        let deletion_timestamp = stored.deletion_timestamp();
        *obj.status_mut() = stored.status().cloned();
        let version = state.next_version();
        let meta = obj.meta_mut();
        meta.uid = uid;
        meta.generation = Some(generation);
        meta.deletion_timestamp = deletion_timestamp;
        meta.resource_version = Some(version);
        Ok(self.store_or_release(&mut state, key, obj))
    }

    /// Request deletion
    ///
    /// An object with finalizers is only marked with a `deletionTimestamp`,
    /// and goes away once its last finalizer is removed.
    pub fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        let key = key(namespace, name);
        let Some(stored) = state.objects.get(&key) else {
            return Err(ErrorResponse::not_found(K::PLURAL, name).into());
        };
        if stored.finalizers().is_empty() {
            if let Some(obj) = state.objects.remove(&key) {
                self.notify(watcher::Event::Deleted(obj));
            }
            return Ok(());
        }
        if stored.is_deleting() {
            return Ok(());
        }
        let mut obj = stored.clone();
        let version = state.next_version();
        let meta = obj.meta_mut();
        meta.deletion_timestamp = Some(Utc::now());
        meta.resource_version = Some(version);
        state.objects.insert(key, obj.clone());
        self.notify(watcher::Event::Applied(obj));
        Ok(())
    }

    /// All stored objects, ordered by key
    #[must_use]
    pub fn list(&self) -> Vec<K> {
        self.state.lock().objects.values().cloned().collect()
    }

    /// Look at an object without recording a call
    #[must_use]
    pub fn peek(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        self.state.lock().objects.get(&key(namespace, name)).cloned()
    }

    /// Watch for changes
    ///
    /// The stream opens with a [`Restarted`](watcher::Event::Restarted) carrying the
    /// current contents, followed by every later change.
    pub fn watch(&self) -> impl Stream<Item = watcher::Event<K>> + Send + 'static
    where
        K: Send + Sync + 'static,
    {
        let state = self.state.lock();
        let rx = self.events.new_receiver();
        let initial = watcher::Event::Restarted(state.objects.values().cloned().collect());
        drop(state);
        stream::once(async move { initial }).chain(rx)
    }

    /// Requests made through [`ResourceClient`] so far, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forget the recorded requests
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make the next request of kind `verb` fail with `error`
    ///
    /// Repeated calls queue up failures for consecutive requests.
    pub fn fail_next(&self, verb: Verb, error: Error) {
        self.state.lock().faults.entry(verb).or_default().push_back(error);
    }

    /// Record a request and pop any failure queued for it
    fn record(&self, state: &mut State<K>, call: Call) -> Result<(), Error> {
        trace!(verb = ?call.verb, key = %call.key, "request");
        let verb = call.verb;
        state.calls.push(call);
        match state.faults.get_mut(&verb).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Persist `obj`, or drop it if it was deleting and lost its last finalizer
    fn store_or_release(&self, state: &mut State<K>, key: ObjectRef, obj: K) -> K {
        if obj.is_deleting() && obj.finalizers().is_empty() {
            state.objects.remove(&key);
            self.notify(watcher::Event::Deleted(obj.clone()));
        } else {
            state.objects.insert(key, obj.clone());
            self.notify(watcher::Event::Applied(obj.clone()));
        }
        obj
    }
}

#[async_trait]
impl<K> ResourceClient<K> for MemoryStore<K>
where
    K: Resource + HasSpec + HasStatus + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    K::Spec: PartialEq,
    K::Status: Clone + Serialize,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, Error> {
        let mut state = self.state.lock();
        let key = key(namespace, name);
        self.record(&mut state, Call {
            verb: Verb::Get,
            key: key.clone(),
            body: None,
        })?;
        state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ErrorResponse::not_found(K::PLURAL, name).into())
    }

    async fn update_status(&self, obj: &K) -> Result<K, Error> {
        let mut state = self.state.lock();
        let key = key_of(obj);
        let body = serde_json::to_value(obj.status()).map_err(Error::SerdeError)?;
        self.record(&mut state, Call {
            verb: Verb::UpdateStatus,
            key: key.clone(),
            body: Some(body),
        })?;
        let stored = state
            .objects
            .get(&key)
            .ok_or_else(|| ErrorResponse::not_found(K::PLURAL, &key.name))?;
        check_version(obj, stored)?;
        let mut updated = stored.clone();
        *updated.status_mut() = obj.status().cloned();
        updated.meta_mut().resource_version = Some(state.next_version());
        state.objects.insert(key, updated.clone());
        self.notify(watcher::Event::Applied(updated.clone()));
        Ok(updated)
    }

    async fn patch(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Patch<serde_json::Value>,
    ) -> Result<K, Error> {
        let mut state = self.state.lock();
        let key = key(namespace, name);
        let body = match patch {
            Patch::Merge(body) => body,
            _ => {
                return Err(ErrorResponse::new(
                    "UnsupportedMediaType",
                    415,
                    format!("unsupported patch type {}", patch.content_type()),
                )
                .into())
            }
        };
        self.record(&mut state, Call {
            verb: Verb::Patch,
            key: key.clone(),
            body: Some(body.clone()),
        })?;
        let stored = state
            .objects
            .get(&key)
            .ok_or_else(|| ErrorResponse::not_found(K::PLURAL, name))?;
        let expected = body
            .pointer("/metadata/resourceVersion")
            .and_then(serde_json::Value::as_str);
        if expected.is_some_and(|rv| Some(rv) != stored.meta().resource_version.as_deref()) {
            return Err(ErrorResponse::conflict(K::PLURAL, name).into());
        }

        let mut doc = serde_json::to_value(stored).map_err(Error::SerdeError)?;
        patch.apply_to(&mut doc).map_err(Error::SerdeError)?;
        let mut patched: K = serde_json::from_value(doc).map_err(Error::SerdeError)?;
        let generation = stored.generation() + i64::from(stored.spec() != patched.spec());
        let uid = stored.uid();
        let deletion_timestamp = stored.deletion_timestamp();
        let version = state.next_version();
        let meta = patched.meta_mut();
        meta.name = Some(key.name.clone());
        meta.namespace = key.namespace.clone();
        meta.uid = uid;
        meta.generation = Some(generation);
        meta.deletion_timestamp = deletion_timestamp;
        meta.resource_version = Some(version);
        Ok(self.store_or_release(&mut state, key, patched))
    }
}

/// A [`Recorder`] that keeps published events in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryRecorder {
    events: Arc<Mutex<Vec<(ObjectReference, NewEvent)>>>,
    failures: Arc<Mutex<VecDeque<Error>>>,
}

impl MemoryRecorder {
    /// Create a recorder with no events
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<(ObjectReference, NewEvent)> {
        self.events.lock().clone()
    }

    /// Just the `(type, reason)` of each published event
    #[must_use]
    pub fn reasons(&self) -> Vec<(crate::events::EventType, String)> {
        self.events
            .lock()
            .iter()
            .map(|(_, ev)| (ev.event_type, ev.reason.clone()))
            .collect()
    }

    /// Forget published events
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Make the next publish fail with `error`
    pub fn fail_next(&self, error: Error) {
        self.failures.lock().push_back(error);
    }
}

#[async_trait]
impl Recorder for MemoryRecorder {
    async fn publish(&self, reference: &ObjectReference, ev: NewEvent) -> Result<(), Error> {
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        self.events.lock().push((reference.clone(), ev));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, Verb};
    use crate::{
        client::ResourceClient,
        test_utils::{widget, Widget},
        watcher,
    };
    use futures::StreamExt;
    use reconciler_core::{Patch, ResourceExt};
    use serde_json::json;

    #[test]
    fn create_assigns_server_fields() {
        let store = MemoryStore::new();
        let w = store.create(widget("default", "a")).unwrap();
        assert_eq!(w.resource_version().as_deref(), Some("1"));
        assert_eq!(w.generation(), 1);
        assert!(w.uid().is_some());
        let dup = store.create(widget("default", "a")).unwrap_err();
        assert!(matches!(dup, reconciler_core::Error::Api(ref e) if e.reason == "AlreadyExists"));
    }

    #[test]
    fn spec_changes_bump_generation() {
        let store = MemoryStore::new();
        let w = store.create(widget("default", "a")).unwrap();
        let mut relabeled = w.clone();
        relabeled.metadata.labels = Some([("a".to_string(), "b".to_string())].into());
        let relabeled = store.update(relabeled).unwrap();
        assert_eq!(relabeled.generation(), 1);

        let mut resized = relabeled.clone();
        resized.spec.size = 3;
        let resized = store.update(resized).unwrap();
        assert_eq!(resized.generation(), 2);
        assert_eq!(resized.resource_version().as_deref(), Some("3"));

        // stale write
        let err = store.update(w).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn delete_waits_for_finalizers() {
        let store = MemoryStore::<Widget>::new();
        let mut w = widget("default", "a");
        w.metadata.finalizers = Some(vec!["demo".into()]);
        store.create(w).unwrap();
        store.delete(Some("default"), "a").unwrap();
        let deleting = store.peek(Some("default"), "a").unwrap();
        assert!(deleting.is_deleting());

        store.create(widget("default", "b")).unwrap();
        store.delete(Some("default"), "b").unwrap();
        assert!(store.peek(Some("default"), "b").is_none());
        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test]
    async fn removing_last_finalizer_releases_deleting_object() {
        let store = MemoryStore::<Widget>::new();
        let mut w = widget("default", "a");
        w.metadata.finalizers = Some(vec!["demo".into()]);
        store.create(w).unwrap();
        store.delete(Some("default"), "a").unwrap();

        let patch = Patch::Merge(json!({"metadata": {"finalizers": []}}));
        let released = store.patch(Some("default"), "a", &patch).await.unwrap();
        assert!(released.finalizers().is_empty());
        assert!(store.peek(Some("default"), "a").is_none());
    }

    #[tokio::test]
    async fn patch_honours_resource_version_precondition() {
        let store = MemoryStore::<Widget>::new();
        store.create(widget("default", "a")).unwrap();
        let stale = Patch::Merge(json!({"metadata": {"finalizers": ["x"], "resourceVersion": "0"}}));
        assert!(store
            .patch(Some("default"), "a", &stale)
            .await
            .unwrap_err()
            .is_conflict());
        let fresh = Patch::Merge(json!({"metadata": {"finalizers": ["x"], "resourceVersion": "1"}}));
        let patched = store.patch(Some("default"), "a", &fresh).await.unwrap();
        assert_eq!(patched.finalizers(), ["x"]);
        assert_eq!(patched.resource_version().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn injected_faults_apply_once_per_request() {
        let store = MemoryStore::<Widget>::new();
        store.create(widget("default", "a")).unwrap();
        store.fail_next(Verb::Get, reconciler_core::Error::Cancelled);
        assert!(store.get(Some("default"), "a").await.is_err());
        assert!(store.get(Some("default"), "a").await.is_ok());
        assert_eq!(store.calls().len(), 2);
        assert!(store.get(Some("default"), "missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn watch_starts_with_current_contents() {
        let store = MemoryStore::<Widget>::new();
        let a = store.create(widget("default", "a")).unwrap();
        let mut watch = Box::pin(store.watch());
        assert_eq!(watch.next().await, Some(watcher::Event::Restarted(vec![a])));
        let b = store.create(widget("default", "b")).unwrap();
        assert_eq!(watch.next().await, Some(watcher::Event::Applied(b)));
        store.delete(Some("default"), "b").unwrap();
        assert!(matches!(watch.next().await, Some(watcher::Event::Deleted(_))));
    }
}
