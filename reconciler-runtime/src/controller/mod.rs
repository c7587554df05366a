//! Runs a [`Reconcile`] implementation over keys fed from watch streams
mod workqueue;

pub use self::workqueue::WorkQueue;
use crate::{
    config::Config,
    reconciler::{self, ReconcileKind, Reconciler},
    reflector::ObjectRef,
    watcher,
};
use async_trait::async_trait;
use futures::{future, stream, Stream, StreamExt};
use reconciler_core::{HasStatus, Resource};
use std::{future::Future, sync::Arc};
use tracing::{debug, info, warn};

/// Something that can reconcile an object given its key
///
/// The [`Controller`] guarantees that no two calls for the same key overlap.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Why a key should be retried
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reconcile the object at `key`, formatted as `"<namespace>/<name>"`
    async fn reconcile(&self, key: &str) -> Result<(), Self::Error>;
}

#[async_trait]
impl<K, R> Reconcile for Reconciler<K, R>
where
    K: Resource + HasStatus + Clone + Send + Sync + 'static,
    K::Status: PartialEq + Clone + Send + Sync,
    R: ReconcileKind<K> + 'static,
{
    type Error = reconciler::Error<R::Error>;

    async fn reconcile(&self, key: &str) -> Result<(), Self::Error> {
        Reconciler::reconcile(self, key).await
    }
}

/// Enqueues the object itself for reconciliation
pub fn trigger_self<K, S>(stream: S) -> impl Stream<Item = ObjectRef>
where
    K: Resource,
    S: Stream<Item = watcher::Event<K>>,
{
    stream.flat_map(|event| stream::iter(event.into_iter_touched().map(|obj| ObjectRef::from_obj(&obj))))
}

/// Feeds keys into a [`WorkQueue`] and reconciles them on a pool of workers
///
/// Keys whose reconcile fails are re-added with a growing per-key delay; a success
/// resets that delay.
pub struct Controller<R> {
    reconciler: Arc<R>,
    queue: WorkQueue<String>,
    workers: usize,
}

impl<R: Reconcile> Controller<R> {
    /// Create a controller sized and paced by `config`
    pub fn new(reconciler: R, config: &Config) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            queue: WorkQueue::new(config.requeue),
            workers: config.workers.max(1),
        }
    }

    /// A handle to the queue, for enqueueing keys by hand
    #[must_use]
    pub fn queue(&self) -> WorkQueue<String> {
        self.queue.clone()
    }

    /// Reconcile keys from `triggers` until `shutdown` resolves
    ///
    /// The trigger stream ending does not stop the controller. On shutdown, in-flight
    /// reconciles are allowed to finish and queued keys are dropped.
    pub async fn run<S, F>(self, triggers: S, shutdown: F)
    where
        S: Stream<Item = ObjectRef> + Send,
        F: Future<Output = ()> + Send,
    {
        info!(workers = self.workers, "starting controller");
        let workers = (0..self.workers)
            .map(|id| tokio::spawn(worker(id, self.reconciler.clone(), self.queue.clone())))
            .collect::<Vec<_>>();

        let mut triggers = Box::pin(triggers.map(Some).chain(stream::pending()).take_until(shutdown));
        while let Some(Some(obj_ref)) = triggers.next().await {
            self.queue.add(obj_ref.to_string());
        }

        info!("shutting down controller");
        self.queue.shut_down();
        for res in future::join_all(workers).await {
            if let Err(err) = res {
                warn!(%err, "worker task failed");
            }
        }
    }
}

async fn worker<R: Reconcile>(id: usize, reconciler: Arc<R>, queue: WorkQueue<String>) {
    while let Some(key) = queue.get().await {
        match reconciler.reconcile(&key).await {
            Ok(()) => {
                debug!(worker = id, %key, "reconciled");
                queue.forget(&key);
            }
            Err(err) => {
                warn!(
                    worker = id,
                    %key,
                    error = %err,
                    requeues = queue.num_requeues(&key),
                    "reconcile failed, requeueing"
                );
                queue.add_rate_limited(key.clone());
            }
        }
        queue.done(&key);
    }
    debug!(worker = id, "worker stopped");
}
