//! Lifecycle event multiplexing.
//!
//! Every field set may have a local [`EventHandler`]; the root may
//! additionally have a global one. Both receive every event raised beneath
//! them — `FieldTree::raise_event` fans a raised event out to the local
//! handler of the field set it happened in, then to the root's global
//! handler, matching the two-tier local/global listener model.

use std::collections::HashMap;

use crate::value::Value;

/// The lifecycle events the core raises. Field identity is carried as a
/// path rather than a borrowed reference, since listeners are called while
/// the tree itself is mutably borrowed by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A mutator set a new value for the field at `path`.
    FieldValueChanged { path: String },
    /// The field at `path` changed size.
    FieldResized { path: String },
    /// A new field was inserted at `index` during `replace_field`.
    FieldInserted { index: usize, path: String },
    /// `old_path` was replaced by the field now at `new_path`.
    FieldReplaced { old_path: String, new_path: String },
    /// A request to mutate the value of the field at `path`.
    SetFieldValue { path: String, new_value: Value },
}

impl Event {
    fn kind(&self) -> EventKind {
        match self {
            Event::FieldValueChanged { .. } => EventKind::FieldValueChanged,
            Event::FieldResized { .. } => EventKind::FieldResized,
            Event::FieldInserted { .. } => EventKind::FieldInserted,
            Event::FieldReplaced { .. } => EventKind::FieldReplaced,
            Event::SetFieldValue { .. } => EventKind::SetFieldValue,
        }
    }
}

/// The event names a listener can `connect` to, matching spec's
/// `"field-value-changed"`-style names one for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FieldValueChanged,
    FieldResized,
    FieldInserted,
    FieldReplaced,
    SetFieldValue,
}

type Listener = Box<dyn FnMut(&Event) + Send>;

/// A per-event-name multi-listener registry.
#[derive(Default)]
pub struct EventHandler {
    listeners: HashMap<EventKind, Vec<Listener>>,
}

impl EventHandler {
    pub fn new() -> Self {
        EventHandler::default()
    }

    /// Connect a handler to a named event.
    pub fn connect(&mut self, kind: EventKind, handler: impl FnMut(&Event) + Send + 'static) {
        self.listeners.entry(kind).or_default().push(Box::new(handler));
    }

    pub fn raise(&mut self, event: &Event) {
        if let Some(handlers) = self.listeners.get_mut(&event.kind()) {
            for handler in handlers {
                handler(event);
            }
        }
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler").field("kinds", &self.listeners.keys().collect::<Vec<_>>()).finish()
    }
}
