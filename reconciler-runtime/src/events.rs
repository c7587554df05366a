//! Publishes events for objects
use async_trait::async_trait;
use reconciler_core::{Error, ObjectReference};
use std::fmt;
use tracing::{info, warn};

/// Reasons the reconciler attaches to the events it emits on its own behalf
pub mod reason {
    /// Finalizers were added or removed (`Normal`)
    pub const FINALIZER_UPDATE: &str = "FinalizerUpdate";
    /// Writing finalizers or status back to the store failed (`Warning`)
    pub const UPDATE_FAILED: &str = "UpdateFailed";
    /// The reconcile function failed with an unstructured error (`Warning`)
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// Action recorded on events unless [`NewEvent::with_action`] overrides it
pub const DEFAULT_ACTION: &str = "Reconcile";

/// Required information to publish a new event via [`Recorder::publish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    /// The action that was taken (either successfully or unsuccessfully) against
    /// the references object.
    ///
    /// `action` must be machine-readable.
    pub action: String,
    /// The reason explaining why the `action` was taken.
    ///
    /// `reason` must be short and CamelCased.
    pub reason: String,

    /// A optional description of the status of the `action`.
    ///
    /// `note` must be human-readable.
    pub note: Option<String>,

    /// The event severity.
    pub event_type: EventType,
}

impl NewEvent {
    /// An informational event
    pub fn normal(reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(EventType::Normal, reason, note)
    }

    /// An event signalling that something needs attention
    pub fn warning(reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(EventType::Warning, reason, note)
    }

    fn new(event_type: EventType, reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            action: DEFAULT_ACTION.into(),
            reason: reason.into(),
            note: Some(note.into()),
            event_type,
        }
    }

    /// Replace the default action
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }
}

/// The event severity or type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventType {
    /// An event took place - nothing to worry about.
    Normal,
    /// Something is not working as expected - it might be worth to have a look.
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        })
    }
}

/// A publisher abstraction for events attached to objects
///
/// Publishing is fire-and-forget from the reconciler's point of view:
/// a failed publish is logged and otherwise ignored.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Publish a new event attached to `reference`
    async fn publish(&self, reference: &ObjectReference, ev: NewEvent) -> Result<(), Error>;
}

/// A [`Recorder`] that writes events to the `tracing` log
///
/// Useful when no event sink is available. `Warning` events are logged at `warn`,
/// everything else at `info`.
#[derive(Clone, Debug)]
pub struct TracingRecorder {
    reporter: String,
}

impl TracingRecorder {
    /// Create a recorder reporting as the named controller
    #[must_use]
    pub fn new(reporter: impl Into<String>) -> Self {
        Self {
            reporter: reporter.into(),
        }
    }
}

#[async_trait]
impl Recorder for TracingRecorder {
    async fn publish(&self, reference: &ObjectReference, ev: NewEvent) -> Result<(), Error> {
        let note = ev.note.as_deref().unwrap_or_default();
        match ev.event_type {
            EventType::Normal => info!(
                reporter = %self.reporter,
                kind = %reference.kind,
                namespace = reference.namespace.as_deref().unwrap_or_default(),
                name = %reference.name,
                action = %ev.action,
                reason = %ev.reason,
                "{note}"
            ),
            EventType::Warning => warn!(
                reporter = %self.reporter,
                kind = %reference.kind,
                namespace = reference.namespace.as_deref().unwrap_or_default(),
                name = %reference.name,
                action = %ev.action,
                reason = %ev.reason,
                "{note}"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EventType, NewEvent, Recorder, TracingRecorder, DEFAULT_ACTION};
    use reconciler_core::ObjectReference;

    #[test]
    fn constructors_set_severity() {
        let ev = NewEvent::warning("Broken", "it broke");
        assert_eq!(ev.event_type, EventType::Warning);
        assert_eq!(ev.action, DEFAULT_ACTION);
        assert_eq!(ev.note.as_deref(), Some("it broke"));
        assert_eq!(NewEvent::normal("Fine", "").with_action("Sync").action, "Sync");
    }

    #[tokio::test]
    async fn tracing_recorder_never_fails() {
        let recorder = TracingRecorder::new("widget-controller");
        let reference = ObjectReference {
            kind: "Widget".into(),
            name: "foo".into(),
            ..ObjectReference::default()
        };
        recorder
            .publish(&reference, NewEvent::normal("Synced", "all good"))
            .await
            .unwrap();
    }
}
