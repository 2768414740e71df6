//! MemoryDocument: in-process DOM host
//!
//! A small element tree with attributes, classes and listeners, implementing
//! [`Host`] so the delegator can run without a browser:
//! - elements are addressed by [`NodeId`] (identity = index in the arena)
//! - selector matching goes through [`Selector`] with a per-document cache
//! - `dispatch_event` runs capture listeners root-to-target, then bubble
//!   listeners target-to-root
//!
//! No borrow of the tree is held while a listener runs, so listeners may add or
//! remove listeners (or mutate the tree) reentrantly. A listener removed during
//! dispatch does not run afterwards, even if it was already on the path.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use compact_str::CompactString;
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::host::{DomEvent, Host, ListenerFn};
use super::selector::{Selector, SelectorSubject};
use crate::error::DelegateError;

// Parsed selectors kept per document; the oldest entry is evicted first
const SELECTOR_CACHE_CAPACITY: usize = 128;

/// Element handle inside a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Listener handle inside a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Event fired through a [`MemoryDocument`].
#[derive(Debug)]
pub struct MemoryEvent {
    target: NodeId,
    event_type: CompactString,
    default_prevented: Cell<bool>,
}

impl MemoryEvent {
    pub fn target_node(&self) -> NodeId {
        self.target
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

impl DomEvent for MemoryEvent {
    type Element = NodeId;

    fn target(&self) -> Option<NodeId> {
        Some(self.target)
    }

    fn event_type(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.event_type.as_str())
    }

    fn prevent_default(&self) {
        self.default_prevented.set(true);
    }
}

struct Node {
    tag: CompactString,
    attributes: IndexMap<CompactString, CompactString>,
    // Split from the `class` attribute on write
    classes: SmallVec<[CompactString; 4]>,
    parent: Option<NodeId>,
}

struct ListenerRecord {
    id: ListenerId,
    node: NodeId,
    event_type: CompactString,
    capture: bool,
    callback: ListenerFn<MemoryEvent>,
}

#[derive(Default)]
struct Tree {
    nodes: Vec<Node>,
    listeners: Vec<ListenerRecord>,
    next_listener: u64,
}

impl Tree {
    fn node(&self, id: NodeId) -> Result<&Node, DelegateError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| DelegateError::UnknownElement(format!("{id:?}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DelegateError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| DelegateError::UnknownElement(format!("{id:?}")))
    }

    fn is_listening(&self, id: ListenerId) -> bool {
        self.listeners
            .iter()
            .any(|record: &ListenerRecord| record.id == id)
    }

    /// Target first, outermost ancestor last.
    fn path_to_root(&self, target: NodeId) -> SmallVec<[NodeId; 16]> {
        let mut path = SmallVec::new();
        let mut current = Some(target);

        while let Some(id) = current {
            path.push(id);
            current = self.nodes.get(id.0).and_then(|node: &Node| node.parent);
        }

        path
    }

    fn listeners_for(
        &self,
        node: NodeId,
        event_type: &str,
        phase: Phase,
    ) -> SmallVec<[(ListenerId, ListenerFn<MemoryEvent>); 4]> {
        self.listeners
            .iter()
            .filter(|record: &&ListenerRecord| {
                record.node == node
                    && record.event_type.as_str() == event_type
                    && phase.accepts(record)
            })
            .map(|record: &ListenerRecord| (record.id, Rc::clone(&record.callback)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Capturing,
    AtTarget,
    Bubbling,
}

impl Phase {
    fn accepts(self, record: &ListenerRecord) -> bool {
        match self {
            Phase::Capturing => record.capture,
            Phase::AtTarget => true,
            Phase::Bubbling => !record.capture,
        }
    }
}

#[derive(Clone, Copy)]
struct NodeView<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> NodeView<'a> {
    fn node(&self) -> &'a Node {
        &self.tree.nodes[self.id.0]
    }
}

impl SelectorSubject for NodeView<'_> {
    fn tag_name(&self) -> &str {
        &self.node().tag
    }

    fn element_id(&self) -> Option<&str> {
        self.node().attributes.get("id").map(CompactString::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.node()
            .classes
            .iter()
            .any(|candidate: &CompactString| candidate.as_str() == class)
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.node().attributes.get(name).map(CompactString::as_str)
    }

    fn parent_element(&self) -> Option<Self> {
        self.node().parent.map(|id: NodeId| NodeView {
            tree: self.tree,
            id,
        })
    }
}

/// In-process DOM document. Cloning yields another handle to the same tree.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    tree: Rc<RefCell<Tree>>,
    // `None` caches a selector that failed to parse
    selectors: Rc<RefCell<IndexMap<CompactString, Option<Rc<Selector>>>>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        let id = NodeId(tree.nodes.len());

        tree.nodes.push(Node {
            tag: CompactString::from(tag.to_ascii_lowercase()),
            attributes: IndexMap::new(),
            classes: SmallVec::new(),
            parent: None,
        });

        id
    }

    /// Set an attribute; `class` also updates the class list.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DelegateError> {
        let mut tree = self.tree.borrow_mut();
        let node = tree.node_mut(node)?;

        if name == "class" {
            node.classes = value.split_whitespace().map(CompactString::from).collect();
        }
        node.attributes
            .insert(CompactString::from(name), CompactString::from(value));

        Ok(())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let tree = self.tree.borrow();
        let node = tree.node(node).ok()?;

        node.attributes.get(name).map(|value: &CompactString| value.to_string())
    }

    /// Move `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DelegateError> {
        let mut tree = self.tree.borrow_mut();
        tree.node(child)?;
        tree.node(parent)?;

        if tree.path_to_root(parent).contains(&child) {
            return Err(DelegateError::host(
                "appendChild",
                format!("{child:?} is an ancestor of {parent:?}"),
            ));
        }

        tree.node_mut(child)?.parent = Some(parent);

        Ok(())
    }

    /// Detach `node` from its parent.
    pub fn remove(&self, node: NodeId) -> Result<(), DelegateError> {
        self.tree.borrow_mut().node_mut(node)?.parent = None;

        Ok(())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.tree.borrow();
        tree.node(node).ok().and_then(|node: &Node| node.parent)
    }

    /// Convenience: create `<tag>` with the given attributes and append it to `parent`.
    pub fn append_element(
        &self,
        parent: NodeId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> Result<NodeId, DelegateError> {
        let node = self.create_element(tag);

        for (name, value) in attributes {
            self.set_attribute(node, name, value)?;
        }
        self.append_child(parent, node)?;

        Ok(node)
    }

    /// Register a listener on `node`.
    pub fn add_event_listener<F>(
        &self,
        node: NodeId,
        event_type: &str,
        capture: bool,
        callback: F,
    ) -> Result<ListenerId, DelegateError>
    where
        F: Fn(&MemoryEvent) + 'static,
    {
        self.add_listener_rc(node, event_type, capture, Rc::new(callback))
    }

    fn add_listener_rc(
        &self,
        node: NodeId,
        event_type: &str,
        capture: bool,
        callback: ListenerFn<MemoryEvent>,
    ) -> Result<ListenerId, DelegateError> {
        let mut tree = self.tree.borrow_mut();
        tree.node(node)?;

        tree.next_listener += 1;
        let id = ListenerId(tree.next_listener);

        tree.listeners.push(ListenerRecord {
            id,
            node,
            event_type: CompactString::from(event_type),
            capture,
            callback,
        });

        trace!(?node, event_type, capture, ?id, "listener added");

        Ok(id)
    }

    /// Remove a listener; returns whether it was registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut tree = self.tree.borrow_mut();
        let before = tree.listeners.len();

        tree.listeners.retain(|record: &ListenerRecord| record.id != id);

        before != tree.listeners.len()
    }

    /// Number of listeners for `event_type` on `node`, in either phase.
    pub fn listener_count(&self, node: NodeId, event_type: &str) -> usize {
        self.tree
            .borrow()
            .listeners
            .iter()
            .filter(|record: &&ListenerRecord| {
                record.node == node && record.event_type.as_str() == event_type
            })
            .count()
    }

    /// Fire `event_type` at `target` and return the event after propagation.
    pub fn dispatch_event(
        &self,
        target: NodeId,
        event_type: &str,
    ) -> Result<MemoryEvent, DelegateError> {
        let path = {
            let tree = self.tree.borrow();
            tree.node(target)?;
            tree.path_to_root(target)
        };

        let event = MemoryEvent {
            target,
            event_type: CompactString::from(event_type),
            default_prevented: Cell::new(false),
        };

        // path[0] is the target
        for &node in path.iter().skip(1).rev() {
            self.invoke(node, &event, Phase::Capturing);
        }
        self.invoke(target, &event, Phase::AtTarget);
        for &node in path.iter().skip(1) {
            self.invoke(node, &event, Phase::Bubbling);
        }

        Ok(event)
    }

    fn invoke(&self, node: NodeId, event: &MemoryEvent, phase: Phase) {
        let listeners = self
            .tree
            .borrow()
            .listeners_for(node, &event.event_type, phase);

        for (id, callback) in listeners {
            if !self.tree.borrow().is_listening(id) {
                continue;
            }
            callback(event);
        }
    }

    fn selector(&self, source: &str) -> Option<Rc<Selector>> {
        if let Some(cached) = self.selectors.borrow().get(source) {
            return cached.clone();
        }

        let parsed = match Selector::parse(source) {
            Ok(selector) => Some(Rc::new(selector)),
            Err(e) => {
                warn!("Selector never matches: {}", e);
                None
            }
        };

        let mut cache = self.selectors.borrow_mut();
        if cache.len() >= SELECTOR_CACHE_CAPACITY {
            cache.shift_remove_index(0);
        }
        cache.insert(CompactString::from(source), parsed.clone());

        parsed
    }
}

impl Host for MemoryDocument {
    type Element = NodeId;

    type Event = MemoryEvent;

    type Listener = ListenerId;

    fn matches(&self, element: &NodeId, selector: &str) -> bool {
        let Some(selector) = self.selector(selector) else {
            return false;
        };

        let tree = self.tree.borrow();
        if tree.node(*element).is_err() {
            return false;
        }

        selector.matches(&NodeView {
            tree: &tree,
            id: *element,
        })
    }

    fn add_listener(
        &self,
        root: &NodeId,
        event_type: &str,
        callback: ListenerFn<MemoryEvent>,
    ) -> Result<ListenerId, DelegateError> {
        self.add_listener_rc(*root, event_type, true, callback)
    }

    fn remove_listener(&self, _root: &NodeId, _event_type: &str, listener: ListenerId) {
        self.remove_event_listener(listener);
    }
}

impl std::fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.tree.borrow();

        f.debug_struct("MemoryDocument")
            .field("node_count", &tree.nodes.len())
            .field("listener_count", &tree.listeners.len())
            .finish()
    }
}
