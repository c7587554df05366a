//! Writes the reconciler's finalizer token back to the store
use crate::{
    client::ResourceClient,
    reflector::{Lister, ObjectRef},
};
use reconciler_core::{Error, Patch, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

struct FinalizerState {
    wants: bool,
    has: bool,
}

impl FinalizerState {
    fn new<K: Resource>(desired: &K, actual: &K, finalizer_name: &str) -> Self {
        Self {
            wants: desired.finalizers().iter().any(|f| f == finalizer_name),
            has: actual.finalizers().iter().any(|f| f == finalizer_name),
        }
    }
}

/// Bring the stored membership of `finalizer_name` in line with `desired`
///
/// Only the one token is added or removed. Other finalizers are taken from the
/// freshest cached copy rather than from `desired`, and the patch carries that copy's
/// `resourceVersion` so a concurrent edit makes it fail with a conflict instead of
/// being clobbered.
///
/// Returns the patched object, or `None` when the store already agrees.
///
/// # Errors
///
/// Cache lookups and the patch itself may fail. Nothing is retried here.
pub async fn sync_finalizers<K>(
    lister: &dyn Lister<K>,
    client: &dyn ResourceClient<K>,
    finalizer_name: &str,
    desired: &K,
) -> Result<Option<K>, Error>
where
    K: Resource,
{
    let actual = lister.get(&ObjectRef::from_obj(desired))?;
    let mut finalizers = actual.finalizers().to_vec();
    match FinalizerState::new(desired, &*actual, finalizer_name) {
        FinalizerState { wants: true, has: true } | FinalizerState { wants: false, has: false } => {
            debug!(finalizer = finalizer_name, "finalizers already in sync");
            return Ok(None);
        }
        FinalizerState { wants: true, has: false } => finalizers.push(finalizer_name.to_string()),
        FinalizerState { wants: false, has: true } => finalizers.retain(|f| f != finalizer_name),
    }

    let patch = Patch::Merge(json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": actual.resource_version(),
        }
    }));
    let name = actual.name_any();
    let namespace = actual.namespace();
    let updated = client.patch(namespace.as_deref(), &name, &patch).await?;
    info!(finalizer = finalizer_name, ?finalizers, "patched finalizers");
    Ok(Some(updated))
}
