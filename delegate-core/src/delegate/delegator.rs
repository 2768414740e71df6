//! Delegator: one native listener per event type on a single root
//!
//! Handlers are registered per (target key, event type). The delegator keeps
//! exactly one capture-phase listener on the root for every event type that has
//! at least one registration, and routes each native event to the first
//! registration (in insertion order) whose key matches the event's exact target.
//!
//! A `Delegator` is a cheap handle over shared state. Handlers can capture a
//! clone and call `register`/`unregister`/`initialize` while being dispatched:
//! dispatch iterates a snapshot and holds no borrow while a handler runs.
//! Native listeners only keep a `Weak` reference, and dropping the last handle
//! detaches every listener from the root. A handler holding a clone keeps the
//! delegator alive for as long as that handler stays registered.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use compact_str::CompactString;
use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use super::registry::{DispatchStats, Registered, Registry, Removed, first_match};
use super::target::TargetKey;
use crate::config::DelegatorConfig;
use crate::dom::host::{DomEvent, Host, ListenerFn};

struct DelegatorState<H: Host> {
    host: H,
    config: DelegatorConfig,
    registry: Registry<H>,
    root: Option<H::Element>,
    // Native listener currently attached to `root`, per event type
    attached: IndexMap<CompactString, H::Listener>,
}

impl<H: Host> Drop for DelegatorState<H> {
    fn drop(&mut self) {
        let Some(root) = &self.root else {
            return;
        };

        for (event_type, listener) in self.attached.drain(..) {
            self.host.remove_listener(root, &event_type, listener);
        }
    }
}

/// Event delegation over one root element of host `H`.
pub struct Delegator<H: Host> {
    inner: Rc<RefCell<DelegatorState<H>>>,
}

impl<H: Host> Clone for Delegator<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Host> Delegator<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, DelegatorConfig::default())
    }

    pub fn with_config(host: H, config: DelegatorConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DelegatorState {
                host,
                config,
                registry: Registry::new(),
                root: None,
                attached: IndexMap::new(),
            })),
        }
    }

    /// Make `root` the delegation root.
    ///
    /// Every registered event type is detached from the previous root (if any)
    /// and a fresh listener is attached to `root`. Calling this again with the
    /// same root simply re-attaches.
    pub fn initialize(&self, root: H::Element) {
        let (host, previous_root, previous_listeners, event_types) = {
            let mut state = self.inner.borrow_mut();
            let previous_root = state.root.replace(root.clone());
            let previous_listeners: Vec<(CompactString, H::Listener)> =
                state.attached.drain(..).collect();
            let event_types: Vec<CompactString> = state.registry.event_types().cloned().collect();

            (state.host.clone(), previous_root, previous_listeners, event_types)
        };

        if let Some(previous_root) = &previous_root {
            for (event_type, listener) in previous_listeners {
                host.remove_listener(previous_root, &event_type, listener);
            }
        }

        let mut attached = 0;
        for event_type in &event_types {
            if self.attach(&host, &root, event_type) {
                attached += 1;
            }
        }

        info!(
            ?root,
            attached,
            registered = event_types.len(),
            "Delegator initialized"
        );
    }

    /// Route `event_type` events whose target matches `target` to `handler`.
    ///
    /// A second registration for the same key and type replaces the first.
    /// When a root is already set, a new event type is attached right away if
    /// `auto_attach` is on; otherwise it stays inert until `initialize`.
    pub fn register<F>(&self, target: impl Into<TargetKey<H::Element>>, event_type: &str, handler: F)
    where
        F: Fn(&H::Event) + 'static,
    {
        let key = target.into();
        debug!(key = ?key, event_type, "Registering delegated handler");

        let (outcome, pending_root, host, auto_attach) = {
            let mut state = self.inner.borrow_mut();
            let outcome = state.registry.insert(key, event_type, Rc::new(handler));

            let pending_root = match &state.root {
                Some(root) if outcome == Registered::NewType => Some(root.clone()),
                _ => None,
            };

            (outcome, pending_root, state.host.clone(), state.config.auto_attach)
        };

        if outcome == Registered::Replaced {
            debug!(event_type, "Replaced existing handler for target");
        }

        let Some(root) = pending_root else {
            return;
        };

        if auto_attach {
            self.attach(&host, &root, event_type);
        } else {
            warn!(
                event_type,
                "Registration after initialize is inert until initialize is called again"
            );
        }
    }

    /// Remove the handler registered for `target`. Returns whether one existed.
    ///
    /// Removing the last handler of an event type detaches its root listener
    /// and forgets the type.
    pub fn unregister(&self, target: impl Into<TargetKey<H::Element>>, event_type: &str) -> bool {
        let key = target.into();

        let (removed, detach) = {
            let mut state = self.inner.borrow_mut();
            let removed = state.registry.remove(&key, event_type);

            let detach = match removed {
                Removed::LastForType => state.attached.shift_remove(event_type).and_then(
                    |listener: H::Listener| {
                        state
                            .root
                            .clone()
                            .map(|root: H::Element| (state.host.clone(), root, listener))
                    },
                ),
                Removed::Removed | Removed::NotFound => None,
            };

            (removed, detach)
        };

        if let Some((host, root, listener)) = detach {
            host.remove_listener(&root, event_type, listener);
            debug!(event_type, "Last handler removed, root listener detached");
        }

        trace!(key = ?key, event_type, ?removed, "Unregistered delegated handler");

        removed != Removed::NotFound
    }

    /// Drop every registration and detach every root listener.
    pub fn clear(&self) {
        let (host, root, listeners) = {
            let mut state = self.inner.borrow_mut();
            state.registry.clear();
            let listeners: Vec<(CompactString, H::Listener)> = state.attached.drain(..).collect();

            (state.host.clone(), state.root.clone(), listeners)
        };

        if let Some(root) = &root {
            for (event_type, listener) in listeners {
                host.remove_listener(root, &event_type, listener);
            }
        }

        debug!("Delegator cleared");
    }

    pub fn root(&self) -> Option<H::Element> {
        self.inner.borrow().root.clone()
    }

    /// Registered event types, in first-registration order.
    pub fn event_types(&self) -> Vec<CompactString> {
        self.inner.borrow().registry.event_types().cloned().collect()
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.inner.borrow().registry.handler_count(event_type)
    }

    /// Whether a root listener is currently attached for `event_type`.
    pub fn is_listening(&self, event_type: &str) -> bool {
        self.inner.borrow().attached.contains_key(event_type)
    }

    pub fn stats(&self, event_type: &str) -> Option<DispatchStats> {
        self.inner.borrow().registry.stats(event_type)
    }

    pub fn config(&self) -> DelegatorConfig {
        self.inner.borrow().config.clone()
    }

    pub fn host(&self) -> H {
        self.inner.borrow().host.clone()
    }

    fn attach(&self, host: &H, root: &H::Element, event_type: &str) -> bool {
        let weak: Weak<RefCell<DelegatorState<H>>> = Rc::downgrade(&self.inner);
        let callback: ListenerFn<H::Event> =
            Rc::new(move |event: &H::Event| dispatch(&weak, event));

        match host.add_listener(root, event_type, callback) {
            Ok(listener) => {
                let replaced = self
                    .inner
                    .borrow_mut()
                    .attached
                    .insert(CompactString::from(event_type), listener);

                if let Some(stale) = replaced {
                    host.remove_listener(root, event_type, stale);
                }

                trace!(event_type, "Root listener attached");
                true
            }

            Err(e) => {
                warn!("Failed to attach root listener for '{}': {}", event_type, e);
                false
            }
        }
    }
}

/// Native listener body shared by every attached event type.
fn dispatch<H: Host>(state: &Weak<RefCell<DelegatorState<H>>>, event: &H::Event) {
    let Some(state) = state.upgrade() else {
        return;
    };

    let Some(target) = event.target() else {
        trace!("Event without an element target ignored");
        return;
    };

    let event_type = event.event_type();

    let prepared = {
        let Ok(guard) = state.try_borrow() else {
            warn!(%event_type, "Event fired while the delegator was being mutated, ignored");
            return;
        };

        guard.registry.snapshot(&event_type).map(|snapshot| {
            (guard.host.clone(), snapshot, guard.config.prevent_default)
        })
    };

    let Some((host, snapshot, prevent_default)) = prepared else {
        trace!(%event_type, "No registrations for event type");
        return;
    };

    let handled = match first_match(&host, &snapshot, &target) {
        Some(registration) => {
            if prevent_default {
                event.prevent_default();
            }
            (registration.handler)(event);
            true
        }
        None => false,
    };

    trace!(%event_type, ?target, handled, "Event dispatched");

    if let Ok(mut guard) = state.try_borrow_mut() {
        guard.registry.record(&event_type, handled);
    }
}

impl<H: Host> std::fmt::Debug for Delegator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_borrow() {
            Ok(state) => f
                .debug_struct("Delegator")
                .field("root", &state.root)
                .field("event_types", &state.registry.event_types().collect::<Vec<_>>())
                .field("attached", &state.attached.len())
                .finish(),
            Err(_) => f.debug_struct("Delegator").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::dom::memory::{MemoryDocument, MemoryEvent, NodeId};

    struct Fixture {
        doc: MemoryDocument,
        root: NodeId,
        save: NodeId,
        save_label: NodeId,
        cancel: NodeId,
        link: NodeId,
    }

    /// div#app > (button#save.btn > span), button#cancel.btn, a
    fn fixture() -> Fixture {
        let doc = MemoryDocument::new();
        let root = doc.create_element("div");
        doc.set_attribute(root, "id", "app").unwrap();
        let save = doc
            .append_element(root, "button", &[("id", "save"), ("class", "btn")])
            .unwrap();
        let save_label = doc.append_element(save, "span", &[]).unwrap();
        let cancel = doc
            .append_element(root, "button", &[("id", "cancel"), ("class", "btn")])
            .unwrap();
        let link = doc.append_element(root, "a", &[("href", "#")]).unwrap();

        Fixture {
            doc,
            root,
            save,
            save_label,
            cancel,
            link,
        }
    }

    fn counter() -> (Rc<Cell<u32>>, impl Fn(&MemoryEvent) + 'static) {
        let count = Rc::new(Cell::new(0));
        let handle = Rc::clone(&count);
        (count, move |_event: &MemoryEvent| handle.set(handle.get() + 1))
    }

    fn click(f: &Fixture, target: NodeId) -> MemoryEvent {
        f.doc.dispatch_event(target, "click").unwrap()
    }

    #[test]
    fn test_exact_target_handler_runs_once_and_prevents_default() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (h1, handler) = counter();

        delegator.register(TargetKey::Exact(f.save), "click", handler);
        delegator.initialize(f.root);

        let event = click(&f, f.save);

        assert_eq!(h1.get(), 1);
        assert!(event.is_default_prevented());
        assert_eq!(f.doc.listener_count(f.root, "click"), 1);
    }

    #[test]
    fn test_selector_target_handler_runs_for_matching_targets() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (h2, handler) = counter();

        delegator.register(".btn", "click", handler);
        delegator.initialize(f.root);

        assert!(click(&f, f.save).is_default_prevented());
        assert!(click(&f, f.cancel).is_default_prevented());
        assert_eq!(h2.get(), 2);

        let unmatched = click(&f, f.link);
        assert_eq!(h2.get(), 2);
        assert!(!unmatched.is_default_prevented());
    }

    #[test]
    fn test_matching_uses_exact_target_not_ancestors() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (count, handler) = counter();

        delegator.register(".btn", "click", handler);
        delegator.initialize(f.root);

        let event = click(&f, f.save_label);

        assert_eq!(count.get(), 0);
        assert!(!event.is_default_prevented());
    }

    #[test]
    fn test_unregister_removes_handler_and_detaches_listener() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (h1, handler) = counter();

        delegator.register(TargetKey::Exact(f.save), "click", handler);
        delegator.initialize(f.root);
        assert!(delegator.unregister(TargetKey::Exact(f.save), "click"));

        let event = click(&f, f.save);

        assert_eq!(h1.get(), 0);
        assert!(!event.is_default_prevented());
        assert_eq!(f.doc.listener_count(f.root, "click"), 0);
        assert!(!delegator.is_listening("click"));
        assert!(delegator.event_types().is_empty());
        assert_eq!(delegator.stats("click"), None);
    }

    #[test]
    fn test_unregister_before_initialize_leaves_nothing_attached() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (h1, handler) = counter();

        delegator.register(TargetKey::Exact(f.save), "click", handler);
        delegator.unregister(TargetKey::Exact(f.save), "click");
        delegator.initialize(f.root);

        click(&f, f.save);

        assert_eq!(h1.get(), 0);
        assert_eq!(f.doc.listener_count(f.root, "click"), 0);
    }

    #[test]
    fn test_listener_stays_while_other_targets_remain() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (saves, save_handler) = counter();
        let (links, link_handler) = counter();

        delegator.register(TargetKey::Exact(f.save), "click", save_handler);
        delegator.register(TargetKey::Exact(f.link), "click", link_handler);
        delegator.initialize(f.root);

        assert!(delegator.unregister(TargetKey::Exact(f.save), "click"));
        assert!(!delegator.unregister(TargetKey::Exact(f.save), "click"));
        assert!(!delegator.unregister(".btn", "keydown"));

        click(&f, f.save);
        click(&f, f.link);

        assert_eq!(saves.get(), 0);
        assert_eq!(links.get(), 1);
        assert!(delegator.is_listening("click"));
        assert_eq!(delegator.handler_count("click"), 1);
    }

    #[test]
    fn test_second_registration_for_same_key_wins() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (first, first_handler) = counter();
        let (second, second_handler) = counter();

        delegator.register(TargetKey::Exact(f.save), "click", first_handler);
        delegator.register(TargetKey::Exact(f.save), "click", second_handler);
        delegator.initialize(f.root);

        click(&f, f.save);
        click(&f, f.save);

        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 2);
        assert_eq!(delegator.handler_count("click"), 1);
    }

    #[test]
    fn test_first_registered_match_wins() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (by_selector, selector_handler) = counter();
        let (by_element, element_handler) = counter();

        delegator.register("button", "click", selector_handler);
        delegator.register(TargetKey::Exact(f.save), "click", element_handler);
        delegator.initialize(f.root);

        click(&f, f.save);

        assert_eq!(by_selector.get(), 1);
        assert_eq!(by_element.get(), 0);
    }

    #[test]
    fn test_reinitialize_moves_listeners_to_new_root() {
        let f = fixture();
        let panel = f.doc.create_element("section");
        let panel_button = f
            .doc
            .append_element(panel, "button", &[("class", "btn")])
            .unwrap();

        let delegator = Delegator::new(f.doc.clone());
        let (count, handler) = counter();
        let (keys, key_handler) = counter();
        delegator.register(".btn", "click", handler);
        delegator.register(".btn", "keydown", key_handler);

        delegator.initialize(f.root);
        delegator.initialize(panel);

        assert_eq!(f.doc.listener_count(f.root, "click"), 0);
        assert_eq!(f.doc.listener_count(f.root, "keydown"), 0);
        assert_eq!(f.doc.listener_count(panel, "click"), 1);
        assert_eq!(f.doc.listener_count(panel, "keydown"), 1);
        assert_eq!(delegator.root(), Some(panel));

        click(&f, f.save);
        assert_eq!(count.get(), 0);

        click(&f, panel_button);
        f.doc.dispatch_event(panel_button, "keydown").unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(keys.get(), 1);
    }

    #[test]
    fn test_initialize_twice_on_same_root_keeps_single_listener() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (count, handler) = counter();

        delegator.register(".btn", "click", handler);
        delegator.initialize(f.root);
        delegator.initialize(f.root);

        click(&f, f.save);

        assert_eq!(f.doc.listener_count(f.root, "click"), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_late_registration_attaches_automatically() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (count, handler) = counter();

        delegator.initialize(f.root);
        assert!(!delegator.is_listening("click"));

        delegator.register(".btn", "click", handler);
        delegator.register(TargetKey::Exact(f.link), "click", |_event: &MemoryEvent| {});

        assert!(delegator.is_listening("click"));
        assert_eq!(delegator.host().listener_count(f.root, "click"), 1);
        click(&f, f.cancel);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_late_registration_is_inert_without_auto_attach() {
        let f = fixture();
        let config = DelegatorConfig {
            auto_attach: false,
            ..DelegatorConfig::default()
        };
        let delegator = Delegator::with_config(f.doc.clone(), config);
        let (count, handler) = counter();

        delegator.initialize(f.root);
        delegator.register(".btn", "click", handler);
        delegator.register(TargetKey::Exact(f.link), "click", |_event: &MemoryEvent| {});

        assert!(!delegator.config().auto_attach);
        assert!(!delegator.is_listening("click"));
        assert_eq!(f.doc.listener_count(f.root, "click"), 0);
        click(&f, f.save);
        assert_eq!(count.get(), 0);

        delegator.initialize(f.root);
        click(&f, f.save);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_prevent_default_can_be_disabled() {
        let f = fixture();
        let config = DelegatorConfig {
            prevent_default: false,
            ..DelegatorConfig::default()
        };
        let delegator = Delegator::with_config(f.doc.clone(), config);
        let (count, handler) = counter();

        delegator.register(".btn", "click", handler);
        delegator.initialize(f.root);

        let event = click(&f, f.save);

        assert!(!delegator.config().prevent_default);
        assert_eq!(count.get(), 1);
        assert!(!event.is_default_prevented());
    }

    #[test]
    fn test_events_outside_root_are_not_seen() {
        let f = fixture();
        let stray = f.doc.create_element("button");
        f.doc.set_attribute(stray, "class", "btn").unwrap();

        let delegator = Delegator::new(f.doc.clone());
        let (count, handler) = counter();
        delegator.register(".btn", "click", handler);
        delegator.initialize(f.root);

        click(&f, stray);

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_handler_may_unregister_itself_during_dispatch() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let calls = Rc::new(Cell::new(0));

        let reentrant = delegator.clone();
        let seen = Rc::clone(&calls);
        let save = f.save;
        delegator.register(TargetKey::Exact(f.save), "click", move |_event: &MemoryEvent| {
            seen.set(seen.get() + 1);
            reentrant.unregister(TargetKey::Exact(save), "click");
        });
        delegator.initialize(f.root);

        click(&f, f.save);
        click(&f, f.save);

        assert_eq!(calls.get(), 1);
        assert!(!delegator.is_listening("click"));
        assert_eq!(f.doc.listener_count(f.root, "click"), 0);
    }

    #[test]
    fn test_handler_may_register_during_dispatch() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (later, later_handler) = counter();
        let later_handler = Rc::new(later_handler);

        let reentrant = delegator.clone();
        let cancel = f.cancel;
        delegator.register(TargetKey::Exact(f.save), "click", move |_event: &MemoryEvent| {
            let handler = Rc::clone(&later_handler);
            reentrant.register(TargetKey::Exact(cancel), "click", move |event: &MemoryEvent| {
                handler(event)
            });
            let handler = Rc::clone(&later_handler);
            reentrant.register(TargetKey::Exact(cancel), "dblclick", move |event: &MemoryEvent| {
                handler(event)
            });
        });
        delegator.initialize(f.root);

        click(&f, f.cancel);
        assert_eq!(later.get(), 0);

        click(&f, f.save);
        assert_eq!(later.get(), 0);
        assert!(delegator.is_listening("dblclick"));

        click(&f, f.cancel);
        f.doc.dispatch_event(f.cancel, "dblclick").unwrap();
        assert_eq!(later.get(), 2);
    }

    #[test]
    fn test_stats_count_dispatches_per_type() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (_count, handler) = counter();

        delegator.register(".btn", "click", handler);
        delegator.initialize(f.root);

        click(&f, f.save);
        click(&f, f.link);
        click(&f, f.cancel);

        assert_eq!(
            delegator.stats("click"),
            Some(DispatchStats {
                dispatched: 3,
                handled: 2
            })
        );
    }

    #[test]
    fn test_clear_detaches_everything() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (count, handler) = counter();
        let (_keys, key_handler) = counter();

        delegator.register(".btn", "click", handler);
        delegator.register(".btn", "keydown", key_handler);
        delegator.initialize(f.root);
        delegator.clear();

        click(&f, f.save);

        assert_eq!(count.get(), 0);
        assert!(delegator.event_types().is_empty());
        assert_eq!(f.doc.listener_count(f.root, "click"), 0);
        assert_eq!(f.doc.listener_count(f.root, "keydown"), 0);
        assert_eq!(delegator.root(), Some(f.root));
    }

    #[test]
    fn test_dropping_last_handle_detaches_listeners() {
        let f = fixture();
        let (count, handler) = counter();

        {
            let delegator = Delegator::new(f.doc.clone());
            let second_handle = delegator.clone();
            delegator.register(".btn", "click", handler);
            delegator.initialize(f.root);
            drop(delegator);

            assert_eq!(f.doc.listener_count(f.root, "click"), 1);
            assert_eq!(second_handle.handler_count("click"), 1);
        }

        click(&f, f.save);

        assert_eq!(count.get(), 0);
        assert_eq!(f.doc.listener_count(f.root, "click"), 0);
    }

    #[test]
    fn test_independent_delegators_share_a_document() {
        let f = fixture();
        let toolbar = Delegator::new(f.doc.clone());
        let links = Delegator::new(f.doc.clone());
        let (buttons, button_handler) = counter();
        let (anchors, anchor_handler) = counter();

        toolbar.register(".btn", "click", button_handler);
        links.register("a[href]", "click", anchor_handler);
        toolbar.initialize(f.root);
        links.initialize(f.root);

        click(&f, f.save);
        click(&f, f.link);

        assert_eq!(buttons.get(), 1);
        assert_eq!(anchors.get(), 1);
        assert_eq!(f.doc.listener_count(f.root, "click"), 2);

        links.unregister("a[href]", "click");
        assert_eq!(f.doc.listener_count(f.root, "click"), 1);
        assert!(toolbar.is_listening("click"));
    }

    #[test]
    fn test_invalid_selector_never_matches() {
        let f = fixture();
        let delegator = Delegator::new(f.doc.clone());
        let (count, handler) = counter();

        delegator.register("button[", "click", handler);
        delegator.initialize(f.root);

        let event = click(&f, f.save);

        assert_eq!(count.get(), 0);
        assert!(!event.is_default_prevented());
    }
}
