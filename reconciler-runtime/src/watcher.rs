//! Change notifications emitted by a watched resource collection
//!
//! Any store that can produce a stream of these can feed a [`reflector`](crate::reflector())
//! cache and trigger a [`Controller`](crate::Controller).

/// Watch events returned from a store's watch stream
#[derive(Debug, Clone, PartialEq)]
pub enum Event<K> {
    /// An object was added or modified
    Applied(K),
    /// An object was deleted
    ///
    /// NOTE: This should not be used for managing persistent state elsewhere, since
    /// events may be lost if the watcher is unavailable. Use finalizers instead.
    Deleted(K),
    /// The watch stream was restarted, so `Deleted` events may have been missed
    ///
    /// Should be used as a signal to replace the store contents atomically.
    ///
    /// Any objects that were previously [`Applied`](Event::Applied) but are not listed in this event
    /// should be assumed to have been [`Deleted`](Event::Deleted).
    Restarted(Vec<K>),
}

impl<K> Event<K> {
    /// Flattens out all objects that were added or modified in the event.
    ///
    /// `Deleted` objects are ignored, all objects mentioned by `Restarted` events are
    /// emitted individually.
    pub fn into_iter_applied(self) -> impl Iterator<Item = K> {
        match self {
            Event::Applied(obj) => vec![obj],
            Event::Deleted(_) => Vec::new(),
            Event::Restarted(objs) => objs,
        }
        .into_iter()
    }

    /// Flattens out all objects that were added, modified, or deleted in the event.
    ///
    /// Note that `Deleted` events may be missed when restarting the stream. Use finalizers
    /// if you care about cleaning up external resources after deleted objects.
    pub fn into_iter_touched(self) -> impl Iterator<Item = K> {
        match self {
            Event::Applied(obj) | Event::Deleted(obj) => vec![obj],
            Event::Restarted(objs) => objs,
        }
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::Event;

    #[test]
    fn applied_ignores_deletions() {
        assert_eq!(Event::Deleted(1).into_iter_applied().count(), 0);
        assert_eq!(Event::Applied(1).into_iter_applied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(
            Event::Restarted(vec![1, 2]).into_iter_applied().collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn touched_includes_deletions() {
        assert_eq!(Event::Deleted(3).into_iter_touched().collect::<Vec<_>>(), vec![3]);
    }
}
