//! Write parameters understood by resource stores.
use serde::Serialize;

/// Describes changes that should be applied to a resource
///
/// Takes arbitrary serializable data.
///
/// # Creating a patch via serde_json
/// ```
/// use reconciler_core::Patch;
/// let patch = serde_json::json!({
///     "metadata": {
///         "finalizers": ["widgets.example.com"],
///         "resourceVersion": "42"
///     }
/// });
/// let patch = Patch::Merge(&patch);
/// assert_eq!(patch.content_type(), "application/merge-patch+json");
/// ```
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone)]
pub enum Patch<T: Serialize> {
    /// [JSON Merge patch](https://datatracker.ietf.org/doc/html/rfc7386)
    ///
    /// Objects are merged recursively, `null` removes a key, and arrays are
    /// replaced wholesale. Including `metadata.resourceVersion` makes the
    /// patch subject to optimistic concurrency.
    Merge(T),
}

impl<T: Serialize> Patch<T> {
    /// The media type a store expects for this patch strategy
    pub fn content_type(&self) -> &'static str {
        match &self {
            Self::Merge(_) => "application/merge-patch+json",
        }
    }

    /// Serialize the patch body
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Merge(p) => serde_json::to_vec(p),
        }
    }

    /// Apply the patch to a JSON document in place
    ///
    /// This is what a store does on receipt of the patch.
    pub fn apply_to(&self, target: &mut serde_json::Value) -> Result<(), serde_json::Error> {
        match self {
            Self::Merge(p) => {
                json_patch::merge(target, &serde_json::to_value(p)?);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Patch;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn merge_replaces_arrays_and_keeps_siblings() {
        let mut doc = json!({
            "metadata": { "name": "foo", "finalizers": ["a", "b"], "resourceVersion": "1" },
            "spec": { "size": 3 }
        });
        let patch = Patch::Merge(json!({ "metadata": { "finalizers": ["b"], "resourceVersion": "1" } }));
        patch.apply_to(&mut doc).unwrap();
        assert_json_eq!(
            doc,
            json!({
                "metadata": { "name": "foo", "finalizers": ["b"], "resourceVersion": "1" },
                "spec": { "size": 3 }
            })
        );
    }

    #[test]
    fn merge_null_removes_keys() {
        let mut doc = json!({ "status": { "ready": true } });
        Patch::Merge(json!({ "status": null })).apply_to(&mut doc).unwrap();
        assert_json_eq!(doc, json!({}));
    }

    #[test]
    fn serializes_body() {
        let patch = Patch::Merge(json!({ "a": 1 }));
        assert_eq!(patch.serialize().unwrap(), br#"{"a":1}"#.to_vec());
    }
}
