use reconciler_core::{Resource, ResourceExt};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// A namespaced (if relevant) reference to an object, used as a cache and work-queue key
///
/// Renders as, and parses from, `"<namespace>/<name>"`. Cluster-scoped objects
/// have an empty namespace segment.
///
/// ```
/// use reconciler_runtime::reflector::ObjectRef;
/// let key: ObjectRef = "default/foo".parse().unwrap();
/// assert_eq!(key, ObjectRef::new("foo").within("default"));
/// assert_eq!(key.to_string(), "default/foo");
/// assert!("foo".parse::<ObjectRef>().is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct ObjectRef {
    /// The namespace of the object
    ///
    /// May only be `None` if the kind is cluster-scoped (not located in a namespace).
    pub namespace: Option<String>,
    /// The name of the object
    pub name: String,
}

/// Reasons a key string does not address an object
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectRefError {
    /// There was no `/` separating namespace and name
    #[error("key {0:?} is not of the form <namespace>/<name>")]
    MissingSeparator(String),
    /// There was more than one `/`
    #[error("key {0:?} has too many segments")]
    TooManySegments(String),
    /// The name segment was empty
    #[error("key {0:?} has an empty name")]
    EmptyName(String),
}

impl ObjectRef {
    /// Reference an object by name
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Place the reference within a namespace
    #[must_use]
    pub fn within(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Creates `ObjectRef` from the resource
    #[must_use]
    pub fn from_obj<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }

    /// The namespace, or `""` for cluster-scoped objects
    #[must_use]
    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace_str(), self.name)
    }
}

impl FromStr for ObjectRef {
    type Err = ObjectRefError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = key
            .split_once('/')
            .ok_or_else(|| ObjectRefError::MissingSeparator(key.to_string()))?;
        if name.contains('/') {
            return Err(ObjectRefError::TooManySegments(key.to_string()));
        }
        if name.is_empty() {
            return Err(ObjectRefError::EmptyName(key.to_string()));
        }
        Ok(Self {
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectRef, ObjectRefError};

    #[test]
    fn display_should_follow_expected_format() {
        assert_eq!(
            format!("{}", ObjectRef::new("my-widget").within("my-namespace")),
            "my-namespace/my-widget"
        );
        assert_eq!(format!("{}", ObjectRef::new("my-node")), "/my-node");
    }

    #[test]
    fn parse_should_invert_display() {
        for key in ["ns/a", "/cluster-wide"] {
            assert_eq!(key.parse::<ObjectRef>().unwrap().to_string(), key);
        }
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert_eq!(
            "not-a-valid-key-with-no-slash".parse::<ObjectRef>(),
            Err(ObjectRefError::MissingSeparator(
                "not-a-valid-key-with-no-slash".into()
            ))
        );
        assert!(matches!(
            "a/b/c".parse::<ObjectRef>(),
            Err(ObjectRefError::TooManySegments(_))
        ));
        assert!(matches!("ns/".parse::<ObjectRef>(), Err(ObjectRefError::EmptyName(_))));
    }
}
