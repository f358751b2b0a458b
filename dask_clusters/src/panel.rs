//! The sidebar panel's lifecycle and input-event plumbing.
//!
//! Attaching a [`Panel`] registers its pointer and drag listeners on an
//! [`EventTarget`] and shows the manager; detaching removes every one of them
//! and hides it. Each registration is held as a [`Listener`] guard that
//! deregisters itself when dropped, so there is no path that leaks one.
//!
//! A pointer-down starts a drag gesture, which adds document-level move/up
//! listeners until the matching pointer-up (or until detach). None of the
//! handlers do anything with clusters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::ClusterApi;
use crate::manager::ClusterManager;

/// Kinds of input event the panel listens for.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum EventKind {
    /// A pointer button was pressed.
    PointerDown,
    /// A pointer button was released.
    PointerUp,
    /// The pointer moved.
    PointerMove,
    /// A drag entered the panel.
    DragEnter,
    /// A drag left the panel.
    DragLeave,
    /// A drag is moving over the panel.
    DragOver,
}

impl EventKind {
    /// The events the panel's own node listens for while attached.
    pub const NODE_EVENTS: [EventKind; 6] = [
        EventKind::PointerDown,
        EventKind::PointerUp,
        EventKind::PointerMove,
        EventKind::DragEnter,
        EventKind::DragLeave,
        EventKind::DragOver,
    ];

    /// The document-level events added for the length of a drag gesture.
    pub const GESTURE_EVENTS: [EventKind; 2] = [EventKind::PointerMove, EventKind::PointerUp];
}

/// Where a listener is installed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Scope {
    /// The panel's own node.
    Node,
    /// The whole document.
    Document,
}

/// Identifies one registration with an [`EventTarget`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListenerId(u64);

/// Something listeners can be added to and removed from.
pub trait EventTarget: Send + Sync {
    /// Register interest in `kind` events at `scope`.
    fn add_listener(&self, scope: Scope, kind: EventKind) -> ListenerId;

    /// Undo an earlier `add_listener`.
    fn remove_listener(&self, id: ListenerId);
}

/// A registered listener. Dropping it removes the registration.
pub struct Listener {
    target: Arc<dyn EventTarget>,
    id: ListenerId,
}

impl Listener {
    /// Register a listener on `target`.
    pub fn add(target: &Arc<dyn EventTarget>, scope: Scope, kind: EventKind) -> Listener {
        let id = target.add_listener(scope, kind);
        Listener {
            target: Arc::clone(target),
            id,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.target.remove_listener(self.id);
    }
}

/// Everything registered while the panel is attached.
struct Attachment {
    _node: Vec<Listener>,
    gesture: Option<Vec<Listener>>,
}

/// The cluster sidebar panel.
pub struct Panel<A: ClusterApi> {
    manager: Arc<ClusterManager<A>>,
    target: Arc<dyn EventTarget>,
    attachment: Option<Attachment>,
}

impl<A: ClusterApi> Panel<A> {
    /// Create a detached panel for `manager`, listening on `target` once
    /// attached.
    pub fn new(manager: Arc<ClusterManager<A>>, target: Arc<dyn EventTarget>) -> Panel<A> {
        Panel {
            manager,
            target,
            attachment: None,
        }
    }

    /// The manager behind this panel.
    pub fn manager(&self) -> &Arc<ClusterManager<A>> {
        &self.manager
    }

    /// Is the panel attached?
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Register our listeners and show the panel. Attaching twice does
    /// nothing.
    pub fn attach(&mut self) {
        if self.attachment.is_some() {
            return;
        }
        let node = EventKind::NODE_EVENTS
            .iter()
            .map(|&kind| Listener::add(&self.target, Scope::Node, kind))
            .collect();
        self.attachment = Some(Attachment {
            _node: node,
            gesture: None,
        });
        debug!("panel attached");
        self.manager.set_visible(true);
    }

    /// Remove every listener we registered, including any left over from an
    /// unfinished drag gesture, and hide the panel.
    pub fn detach(&mut self) {
        if self.attachment.take().is_some() {
            debug!("panel detached");
            self.manager.set_visible(false);
        }
    }

    /// Handle an input event delivered to the panel.
    pub fn handle_event(&mut self, kind: EventKind) {
        let target = &self.target;
        let attachment = match self.attachment.as_mut() {
            Some(attachment) => attachment,
            None => return,
        };
        match kind {
            EventKind::PointerDown if attachment.gesture.is_none() => {
                trace!("drag gesture started");
                attachment.gesture = Some(
                    EventKind::GESTURE_EVENTS
                        .iter()
                        .map(|&kind| Listener::add(target, Scope::Document, kind))
                        .collect(),
                );
            }
            EventKind::PointerUp => {
                if attachment.gesture.take().is_some() {
                    trace!("drag gesture ended");
                }
            }
            _ => trace!("ignoring {:?}", kind),
        }
    }
}

impl<A: ClusterApi> Drop for Panel<A> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// An in-process [`EventTarget`] that keeps track of live registrations.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<ListenerId, (Scope, EventKind)>>,
}

impl ListenerRegistry {
    /// How many listeners are registered at `scope`?
    pub fn count(&self, scope: Scope) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|(s, _)| *s == scope)
            .count()
    }

    /// Is anything listening for `kind` at any scope?
    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .any(|(_, k)| *k == kind)
    }

    /// Total number of live registrations.
    pub fn len(&self) -> usize {
        self.count(Scope::Node) + self.count(Scope::Document)
    }

    /// Are there no live registrations?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventTarget for ListenerRegistry {
    fn add_listener(&self, scope: Scope, kind: EventKind) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, (scope, kind));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
    }
}

#[cfg(test)]
use crate::testing::{FakeApi, ScriptedDialog};

#[cfg(test)]
fn panel() -> (Panel<FakeApi>, Arc<ListenerRegistry>) {
    let registry = Arc::new(ListenerRegistry::default());
    let manager = ClusterManager::builder(FakeApi::default(), ScriptedDialog::Cancel).build();
    let target: Arc<dyn EventTarget> = registry.clone();
    (Panel::new(manager, target), registry)
}

#[test]
fn attach_and_detach_are_symmetric() {
    let (mut panel, registry) = panel();
    assert!(registry.is_empty());

    panel.attach();
    assert_eq!(registry.count(Scope::Node), EventKind::NODE_EVENTS.len());
    assert!(registry.is_listening(EventKind::DragOver));
    assert!(panel.manager().is_visible());

    panel.attach();
    assert_eq!(registry.len(), EventKind::NODE_EVENTS.len());

    panel.detach();
    assert!(registry.is_empty());
    assert!(!panel.manager().is_visible());
}

#[test]
fn drag_gesture_listeners_come_and_go() {
    let (mut panel, registry) = panel();
    panel.attach();

    panel.handle_event(EventKind::PointerDown);
    assert_eq!(registry.count(Scope::Document), 2);
    panel.handle_event(EventKind::PointerDown);
    assert_eq!(registry.count(Scope::Document), 2);
    panel.handle_event(EventKind::DragOver);
    panel.handle_event(EventKind::PointerUp);
    assert_eq!(registry.count(Scope::Document), 0);
    assert_eq!(registry.count(Scope::Node), EventKind::NODE_EVENTS.len());
}

#[test]
fn detach_mid_gesture_removes_document_listeners() {
    let (mut panel, registry) = panel();
    panel.attach();
    panel.handle_event(EventKind::PointerDown);
    assert_eq!(registry.count(Scope::Document), 2);

    drop(panel);
    assert!(registry.is_empty());
}

#[test]
fn detached_panel_ignores_events() {
    let (mut panel, registry) = panel();
    panel.handle_event(EventKind::PointerDown);
    assert!(registry.is_empty());
    assert!(!panel.is_attached());
}
