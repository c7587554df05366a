pub use crate::metadata::ObjectMeta;
use crate::object::ObjectReference;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// An accessor trait for a reconcilable resource.
///
/// Implementors carry an [`ObjectMeta`] and know their kind at compile time.
/// These types SHOULD all have required properties:
/// - `.metadata`
/// - `.metadata.name`
///
/// And these optional properties:
/// - `.metadata.namespace`
/// - `.metadata.resource_version`
pub trait Resource {
    /// Kind of the resource, e.g. `Widget`
    const KIND: &'static str;

    /// Lowercase plural name of the kind, e.g. `widgets`
    ///
    /// Used when rendering store errors.
    const PLURAL: &'static str;

    /// Metadata that all persisted resources must have
    fn meta(&self) -> &ObjectMeta;
    /// Metadata that all persisted resources must have
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Generates an object reference for the resource
    fn object_ref(&self) -> ObjectReference {
        let meta = self.meta();
        ObjectReference {
            kind: Self::KIND.to_string(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
            uid: meta.uid.clone(),
            resource_version: meta.resource_version.clone(),
        }
    }
}

static EMPTY_MAP: BTreeMap<String, String> = BTreeMap::new();

/// Helper methods for resources.
pub trait ResourceExt: Resource {
    /// Returns the name of the resource, or the empty string if unset
    fn name_any(&self) -> String;
    /// The namespace the resource is in
    fn namespace(&self) -> Option<String>;
    /// The resource version
    fn resource_version(&self) -> Option<String>;
    /// Unique ID (if you delete resource and then create a new
    /// resource with the same name, it will have different ID)
    fn uid(&self) -> Option<String>;
    /// The generation of the desired state, `0` if the store never set it
    fn generation(&self) -> i64;
    /// When deletion was requested, if it was
    fn deletion_timestamp(&self) -> Option<DateTime<Utc>>;
    /// Whether the object is waiting for its finalizers to be removed
    fn is_deleting(&self) -> bool;
    /// Returns resource labels
    fn labels(&self) -> &BTreeMap<String, String>;
    /// Returns resource annotations
    fn annotations(&self) -> &BTreeMap<String, String>;
    /// Returns resource finalizers
    fn finalizers(&self) -> &[String];
    /// Provides mutable access to the finalizers
    fn finalizers_mut(&mut self) -> &mut Vec<String>;
}

impl<K: Resource> ResourceExt for K {
    fn name_any(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    fn namespace(&self) -> Option<String> {
        self.meta().namespace.clone()
    }

    fn resource_version(&self) -> Option<String> {
        self.meta().resource_version.clone()
    }

    fn uid(&self) -> Option<String> {
        self.meta().uid.clone()
    }

    fn generation(&self) -> i64 {
        self.meta().generation.unwrap_or_default()
    }

    fn deletion_timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta().deletion_timestamp
    }

    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        self.meta().labels.as_ref().unwrap_or(&EMPTY_MAP)
    }

    fn annotations(&self) -> &BTreeMap<String, String> {
        self.meta().annotations.as_ref().unwrap_or(&EMPTY_MAP)
    }

    fn finalizers(&self) -> &[String] {
        self.meta().finalizers.as_deref().unwrap_or_default()
    }

    fn finalizers_mut(&mut self) -> &mut Vec<String> {
        self.meta_mut().finalizers.get_or_insert_with(Vec::new)
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectMeta, Resource, ResourceExt};
    use chrono::Utc;

    #[derive(Clone, Debug, Default)]
    struct Gadget {
        metadata: ObjectMeta,
    }

    impl Resource for Gadget {
        const KIND: &'static str = "Gadget";
        const PLURAL: &'static str = "gadgets";

        fn meta(&self) -> &ObjectMeta {
            &self.metadata
        }

        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    #[test]
    fn finalizers_default_to_empty_and_materialize_on_write() {
        let mut gadget = Gadget::default();
        assert!(gadget.finalizers().is_empty());
        assert!(gadget.metadata.finalizers.is_none());
        gadget.finalizers_mut().push("cleanup".into());
        assert_eq!(gadget.finalizers(), ["cleanup".to_string()]);
    }

    #[test]
    fn deletion_is_signalled_by_timestamp() {
        let mut gadget = Gadget::default();
        assert!(!gadget.is_deleting());
        gadget.metadata.deletion_timestamp = Some(Utc::now());
        assert!(gadget.is_deleting());
    }

    #[test]
    fn object_ref_carries_identity() {
        let gadget = Gadget {
            metadata: ObjectMeta {
                name: Some("g1".into()),
                namespace: Some("ns".into()),
                uid: Some("abc".into()),
                resource_version: Some("3".into()),
                ..ObjectMeta::default()
            },
        };
        let reference = gadget.object_ref();
        assert_eq!(reference.kind, "Gadget");
        assert_eq!(reference.name, "g1");
        assert_eq!(reference.namespace.as_deref(), Some("ns"));
        assert_eq!(reference.resource_version.as_deref(), Some("3"));
        assert_eq!(gadget.generation(), 0);
    }
}
