//! The generic reconciler: reads an object, runs business logic on a copy,
//! and writes back whatever finalizer and status changes it made
use crate::{
    client::ResourceClient,
    config::{Config, RetryPolicy},
    events::{reason, EventType, NewEvent, Recorder},
    finalizer::sync_finalizers,
    reflector::{Lister, ObjectRef},
    status::update_status,
};
use async_trait::async_trait;
use reconciler_core::{HasStatus, Resource, ResourceExt};
use std::{collections::BTreeSet, fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// A user-facing event returned by business logic in place of a plain error
///
/// It is recorded against the object and the reconcile counts as handled,
/// so the key is not retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerEvent {
    /// Severity
    pub event_type: EventType,
    /// Short CamelCase reason
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

impl ReconcilerEvent {
    /// Report progress
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Report a problem the user has to look at
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ReconcilerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.event_type, self.reason, self.message)
    }
}

impl From<ReconcilerEvent> for NewEvent {
    fn from(ev: ReconcilerEvent) -> Self {
        match ev.event_type {
            EventType::Normal => NewEvent::normal(ev.reason, ev.message),
            EventType::Warning => NewEvent::warning(ev.reason, ev.message),
        }
    }
}

/// What a [`ReconcileKind`] pass achieved
#[derive(Debug)]
pub enum Outcome<E> {
    /// Nothing to report
    Success,
    /// Handled, with something to tell the user
    Event(ReconcilerEvent),
    /// Failed; the key will be retried
    Failure(E),
}

impl<E> Outcome<E> {
    /// Whether a deleting object may lose the reconciler's finalizer after this outcome
    ///
    /// Anything short of a `Warning` or a failure counts as clean.
    pub fn permits_finalization(&self) -> bool {
        match self {
            Outcome::Success => true,
            Outcome::Event(ev) => ev.event_type == EventType::Normal,
            Outcome::Failure(_) => false,
        }
    }
}

impl<E> From<Result<(), E>> for Outcome<E> {
    fn from(res: Result<(), E>) -> Self {
        match res {
            Ok(()) => Outcome::Success,
            Err(err) => Outcome::Failure(err),
        }
    }
}

impl<E> From<ReconcilerEvent> for Outcome<E> {
    fn from(ev: ReconcilerEvent) -> Self {
        Outcome::Event(ev)
    }
}

/// Business logic for one kind of object
///
/// `obj` is a private copy of the cached object. Changes to its status and finalizers
/// are persisted after this returns, whatever the outcome. Changes to anything else
/// are discarded.
#[async_trait]
pub trait ReconcileKind<K: Send + 'static>: Send + Sync {
    /// Error type for failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// Drive the world towards `obj`'s spec and record what was observed in its status
    async fn reconcile_kind(&self, obj: &mut K) -> Outcome<Self::Error>;
}

/// Reasons a reconcile should be retried
#[derive(Debug, Error)]
pub enum Error<E: std::error::Error + 'static> {
    /// The cache could not be read
    #[error("failed to read object from cache: {0}")]
    Lister(#[source] reconciler_core::Error),
    /// Adding or removing the finalizer failed
    #[error("failed to update finalizers: {0}")]
    FinalizerSync(#[source] reconciler_core::Error),
    /// Writing the status failed
    #[error("failed to update status: {0}")]
    StatusSync(#[source] reconciler_core::Error),
    /// The business logic failed
    #[error("reconcile failed: {0}")]
    ReconcileFailed(#[source] E),
}

/// Runs a [`ReconcileKind`] against objects of kind `K` addressed by key
pub struct Reconciler<K, R> {
    client: Arc<dyn ResourceClient<K>>,
    lister: Arc<dyn Lister<K>>,
    recorder: Arc<dyn Recorder>,
    reconciler: R,
    finalizer_name: Option<String>,
    retry: RetryPolicy,
}

impl<K, R> Reconciler<K, R>
where
    K: Resource + HasStatus + Clone + Send + Sync + 'static,
    K::Status: PartialEq + Clone + Send + Sync,
    R: ReconcileKind<K>,
{
    /// Create a reconciler without finalization, using the default status retry policy
    pub fn new(
        client: Arc<dyn ResourceClient<K>>,
        lister: Arc<dyn Lister<K>>,
        recorder: Arc<dyn Recorder>,
        reconciler: R,
    ) -> Self {
        Self {
            client,
            lister,
            recorder,
            reconciler,
            finalizer_name: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Manage the finalizer token `name`
    ///
    /// It is attached to every live object before business logic runs, and removed
    /// from a deleting object once business logic has finished cleanly.
    #[must_use]
    pub fn finalizer(mut self, name: impl Into<String>) -> Self {
        self.finalizer_name = Some(name.into());
        self
    }

    /// Replace the retry budget for status conflicts
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Take the finalizer and retry settings from `config`
    ///
    /// A config without `finalizerName` keeps any finalizer set through [`Self::finalizer`].
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        if let Some(name) = &config.finalizer_name {
            self.finalizer_name = Some(name.clone());
        }
        self.retry = config.status_retry;
        self
    }

    /// The business logic
    pub fn inner(&self) -> &R {
        &self.reconciler
    }

    /// Reconcile the object at `key`, formatted as `"<namespace>/<name>"`
    ///
    /// Returns `Ok` when there is nothing left to do for the key, including when
    /// the key is malformed or the object no longer exists.
    ///
    /// # Errors
    ///
    /// An error means the key should be retried later.
    #[instrument(skip(self), fields(kind = K::KIND))]
    pub async fn reconcile(&self, key: &str) -> Result<(), Error<R::Error>> {
        let obj_ref = match key.parse::<ObjectRef>() {
            Ok(obj_ref) => obj_ref,
            Err(err) => {
                error!(%err, "invalid resource key");
                return Ok(());
            }
        };
        let original = match self.lister.get(&obj_ref) {
            Ok(obj) => obj,
            Err(err) if err.is_not_found() => {
                debug!("resource no longer exists");
                return Ok(());
            }
            Err(err) => return Err(Error::Lister(err)),
        };
        let mut resource = K::clone(&original);
        let name = resource.name_any();

        if let Some(finalizer) = self.finalizer_name.as_deref() {
            if !resource.is_deleting() && !resource.finalizers().iter().any(|f| f == finalizer) {
                resource.finalizers_mut().push(finalizer.to_string());
            }
        }

        let outcome = self.reconciler.reconcile_kind(&mut resource).await;

        if let Some(finalizer) = self.finalizer_name.as_deref() {
            if resource.is_deleting() && outcome.permits_finalization() {
                resource.finalizers_mut().retain(|f| f != finalizer);
            }
            if !same_finalizers(&*original, &resource) {
                match sync_finalizers(&*self.lister, &*self.client, finalizer, &resource).await {
                    Ok(Some(_)) => {
                        self.publish(
                            &resource,
                            NewEvent::normal(
                                reason::FINALIZER_UPDATE,
                                format!("Updated {name:?} finalizers"),
                            ),
                        )
                        .await;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%err, "failed to update finalizers");
                        self.publish(
                            &resource,
                            NewEvent::warning(
                                reason::UPDATE_FAILED,
                                format!("Failed to update finalizers for {name:?}: {err}"),
                            ),
                        )
                        .await;
                        return Err(Error::FinalizerSync(err));
                    }
                }
            }
        }

        if original.status() != resource.status() {
            match update_status(&*self.client, &self.retry, &original, &resource).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() && resource.is_deleting() => {
                    debug!("resource released before its status could be written");
                }
                Err(err) => {
                    warn!(%err, "failed to update status");
                    self.publish(
                        &resource,
                        NewEvent::warning(
                            reason::UPDATE_FAILED,
                            format!("Failed to update status for {name:?}: {err}"),
                        ),
                    )
                    .await;
                    return Err(Error::StatusSync(err));
                }
            }
        }

        match outcome {
            Outcome::Success => Ok(()),
            Outcome::Event(ev) => {
                debug!(%ev, "reconcile finished with event");
                self.publish(&resource, ev.into()).await;
                Ok(())
            }
            Outcome::Failure(err) => {
                warn!(%err, "reconcile failed");
                self.publish(&resource, NewEvent::warning(reason::INTERNAL_ERROR, err.to_string()))
                    .await;
                Err(Error::ReconcileFailed(err))
            }
        }
    }

    async fn publish(&self, obj: &K, ev: NewEvent) {
        if let Err(err) = self.recorder.publish(&obj.object_ref(), ev).await {
            warn!(%err, "failed to publish event");
        }
    }
}

fn same_finalizers<K: Resource>(a: &K, b: &K) -> bool {
    let a = a.finalizers().iter().collect::<BTreeSet<_>>();
    let b = b.finalizers().iter().collect::<BTreeSet<_>>();
    a == b
}
