//! The authoritative store the reconciler writes to
use async_trait::async_trait;
use reconciler_core::{Error, Patch};

/// Read and conditional-write access to the authoritative copy of objects of kind `K`
///
/// Writes are guarded by optimistic concurrency: an object carrying a
/// `metadata.resourceVersion` that no longer matches the stored one is rejected
/// with a `Conflict` API error.
#[async_trait]
pub trait ResourceClient<K>: Send + Sync {
    /// Fetch the object, bypassing any cache
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, Error>;

    /// Replace the status of the object, keeping everything else as stored
    async fn update_status(&self, obj: &K) -> Result<K, Error>;

    /// Apply a patch to the object
    async fn patch(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Patch<serde_json::Value>,
    ) -> Result<K, Error>;
}
