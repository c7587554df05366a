//! Metadata structs carried by every reconcilable resource.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata that all persisted resources must have
///
/// Field names and semantics follow the Kubernetes `metadata` block, so objects
/// serialized by a store speaking that dialect round-trip unchanged.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Name of the object, unique within its namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace the object lives in
    ///
    /// `None` for cluster-scoped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Store-assigned unique identifier, stable for the lifetime of the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// A sequence number bumped by the store whenever the desired state changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,

    /// Opaque version token used for optimistic concurrency
    ///
    /// Every successful write changes it. Writes that carry a stale value are
    /// rejected with a `Conflict`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Set by the store when deletion has been requested but finalizers remain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    /// Tokens that must all be removed before the store hard-deletes the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalizers: Option<Vec<String>>,

    /// Identifying key/value pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Non-identifying key/value pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}
