//! Writes the status produced by a reconcile back to the store
use crate::{client::ResourceClient, config::RetryPolicy};
use reconciler_core::{Error, HasStatus, Resource, ResourceExt};
use tracing::{debug, info};

/// Persist `desired`'s status, retrying on version conflicts
///
/// The first attempt writes onto `original`, which saves a read when nothing raced us.
/// Every later attempt re-reads the object from the store and replays the same
/// desired status onto it. Attempts stop as soon as the stored status already matches.
///
/// # Errors
///
/// Non-conflict errors are returned immediately. Once `policy` is exhausted the
/// last conflict is returned.
pub async fn update_status<K>(
    client: &dyn ResourceClient<K>,
    policy: &RetryPolicy,
    original: &K,
    desired: &K,
) -> Result<(), Error>
where
    K: Resource + HasStatus + Clone,
    K::Status: PartialEq + Clone,
{
    let name = original.name_any();
    let namespace = original.namespace();
    let mut backoff = policy.backoff();
    let mut attempt = 0_usize;
    loop {
        let mut base = if attempt == 0 {
            original.clone()
        } else {
            client.get(namespace.as_deref(), &name).await?
        };
        if base.status() == desired.status() {
            debug!(attempt, "status already up to date");
            return Ok(());
        }
        *base.status_mut() = desired.status().cloned();

        match client.update_status(&base).await {
            Ok(updated) => {
                info!(attempt, resource_version = ?updated.resource_version(), "updated status");
                return Ok(());
            }
            Err(err) if err.is_conflict() => match backoff.next() {
                Some(delay) => {
                    debug!(attempt, ?delay, "status update conflicted, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}
