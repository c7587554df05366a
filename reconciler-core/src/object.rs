//! Spec/status accessors and object references.
use serde::{Deserialize, Serialize};

/// A trait to access the `spec` of a resource.
///
/// The spec is the desired state written by users. Reconcilers only ever read it.
pub trait HasSpec {
    /// The type of the `spec` of this resource
    type Spec;

    /// Returns a reference to the `spec` of the object
    fn spec(&self) -> &Self::Spec;

    /// Returns a mutable reference to the `spec` of the object
    fn spec_mut(&mut self) -> &mut Self::Spec;
}

/// A trait to access the `status` of a resource.
///
/// The status is the observed state, owned by the reconciler and persisted
/// through the status subresource.
pub trait HasStatus {
    /// The type of the `status` object
    type Status;

    /// Returns an optional reference to the `status` of the object
    fn status(&self) -> Option<&Self::Status>;

    /// Returns an optional mutable reference to the `status` of the object
    fn status_mut(&mut self) -> &mut Option<Self::Status>;
}

/// A reference to a specific object, used to attach events to it
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// Kind of the referent
    pub kind: String,
    /// Namespace of the referent, `None` for cluster-scoped kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Name of the referent
    pub name: String,
    /// UID of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Resource version of the referent at the time the reference was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}
