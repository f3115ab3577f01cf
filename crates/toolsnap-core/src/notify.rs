//! Snapshot lifecycle notifications.
//!
//! Hosts register callbacks per event; the manager emits an event after
//! the corresponding operation commits. Delivery is synchronous and in
//! registration order. A failing listener is logged and never affects
//! the operation or the remaining listeners.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error};

/// Snapshot lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotEvent {
    /// A snapshot was created and saved.
    Created,
    /// A snapshot was applied to disk.
    Restored,
    /// A snapshot was removed from the store.
    Deleted,
}

impl SnapshotEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotEvent::Created => "snapshot.created",
            SnapshotEvent::Restored => "snapshot.restored",
            SnapshotEvent::Deleted => "snapshot.deleted",
        }
    }

    /// Parse an event from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "snapshot.created" => Some(SnapshotEvent::Created),
            "snapshot.restored" => Some(SnapshotEvent::Restored),
            "snapshot.deleted" => Some(SnapshotEvent::Deleted),
            _ => None,
        }
    }
}

/// A registered notification callback.
pub type Listener = Box<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Registry of notification callbacks by event.
#[derive(Default)]
pub struct SnapshotNotifier {
    listeners: HashMap<SnapshotEvent, Vec<Listener>>,
}

impl SnapshotNotifier {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an event.
    pub fn register<F>(&mut self, event: SnapshotEvent, listener: F)
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners
            .entry(event)
            .or_default()
            .push(Box::new(listener));
    }

    /// Deliver an event to every registered listener, in order.
    pub fn emit(&self, event: SnapshotEvent, payload: &Value) {
        let Some(listeners) = self.listeners.get(&event) else {
            return;
        };
        for listener in listeners {
            match listener(payload) {
                Ok(()) => {
                    debug!(event = event.as_str(), "Notified snapshot listener");
                }
                Err(e) => {
                    error!(event = event.as_str(), error = %e, "Snapshot listener failed");
                }
            }
        }
    }

    /// Check if any listeners are registered for an event.
    pub fn has_listeners(&self, event: SnapshotEvent) -> bool {
        self.listeners
            .get(&event)
            .map(|l| !l.is_empty())
            .unwrap_or(false)
    }

    /// Number of listeners registered for an event.
    pub fn count(&self, event: SnapshotEvent) -> usize {
        self.listeners.get(&event).map(|l| l.len()).unwrap_or(0)
    }
}

impl fmt::Debug for SnapshotNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(&str, usize)> = self
            .listeners
            .iter()
            .map(|(event, listeners)| (event.as_str(), listeners.len()))
            .collect();
        f.debug_struct("SnapshotNotifier")
            .field("listeners", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_event_names_round_trip() {
        assert_eq!(SnapshotEvent::Created.as_str(), "snapshot.created");
        assert_eq!(SnapshotEvent::Restored.as_str(), "snapshot.restored");
        assert_eq!(SnapshotEvent::Deleted.as_str(), "snapshot.deleted");

        assert_eq!(
            SnapshotEvent::parse("snapshot.created"),
            Some(SnapshotEvent::Created)
        );
        assert_eq!(SnapshotEvent::parse("unknown"), None);
    }

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut notifier = SnapshotNotifier::new();

        for tag in ["first", "second"] {
            let calls = Arc::clone(&calls);
            notifier.register(SnapshotEvent::Created, move |payload| {
                calls
                    .lock()
                    .unwrap()
                    .push((tag, payload["id"].as_str().unwrap_or("").to_string()));
                Ok(())
            });
        }

        notifier.emit(SnapshotEvent::Created, &json!({"id": "snap_x"}));

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("first", "snap_x".to_string()),
                ("second", "snap_x".to_string())
            ]
        );
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let reached = Arc::new(AtomicUsize::new(0));
        let mut notifier = SnapshotNotifier::new();

        notifier.register(SnapshotEvent::Deleted, |_| {
            anyhow::bail!("listener exploded")
        });
        let reached_clone = Arc::clone(&reached);
        notifier.register(SnapshotEvent::Deleted, move |_| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        notifier.emit(SnapshotEvent::Deleted, &json!({}));
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_without_listeners_is_a_no_op() {
        let notifier = SnapshotNotifier::new();
        notifier.emit(SnapshotEvent::Restored, &json!({"id": "snap_y"}));
        assert!(!notifier.has_listeners(SnapshotEvent::Restored));
    }

    #[test]
    fn test_listener_counts() {
        let mut notifier = SnapshotNotifier::new();
        assert_eq!(notifier.count(SnapshotEvent::Created), 0);

        notifier.register(SnapshotEvent::Created, |_| Ok(()));
        notifier.register(SnapshotEvent::Created, |_| Ok(()));
        notifier.register(SnapshotEvent::Deleted, |_| Ok(()));

        assert_eq!(notifier.count(SnapshotEvent::Created), 2);
        assert_eq!(notifier.count(SnapshotEvent::Deleted), 1);
        assert!(notifier.has_listeners(SnapshotEvent::Created));
        assert!(!notifier.has_listeners(SnapshotEvent::Restored));
    }
}
