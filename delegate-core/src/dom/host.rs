//! Host: trait abstraction over a DOM-like runtime
//!
//! The delegator never talks to a concrete DOM. Everything it needs from the
//! host is expressed here:
//! - element identity (`PartialEq` on the element handle)
//! - selector matching against a single element
//! - attaching/detaching a capture-phase listener on the root
//! - an event exposing its target, its type and default-action suppression

use std::borrow::Cow;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::DelegateError;

/// Callback installed as the native listener for one event type.
pub type ListenerFn<Ev> = Rc<dyn Fn(&Ev)>;

/// Event object handed to native listeners and delegated handlers.
pub trait DomEvent {
    type Element;

    /// The element the event was originally dispatched to.
    fn target(&self) -> Option<Self::Element>;

    /// Event type name, e.g. `"click"`.
    fn event_type(&self) -> Cow<'_, str>;

    /// Suppress the event's default action.
    fn prevent_default(&self);
}

/// DOM-like host the delegator attaches to.
///
/// Element handles must compare by identity: two handles are equal iff they
/// refer to the same node.
pub trait Host: Clone + 'static {
    type Element: Clone + PartialEq + Debug + 'static;

    type Event: DomEvent<Element = Self::Element> + 'static;

    /// Token returned by `add_listener`, handed back to `remove_listener`.
    type Listener: 'static;

    /// Selector predicate for one element. Invalid selectors match nothing.
    fn matches(&self, element: &Self::Element, selector: &str) -> bool;

    /// Attach `callback` to `root` for `event_type` in the capture phase.
    fn add_listener(
        &self,
        root: &Self::Element,
        event_type: &str,
        callback: ListenerFn<Self::Event>,
    ) -> Result<Self::Listener, DelegateError>;

    /// Detach a listener previously returned by `add_listener`.
    fn remove_listener(&self, root: &Self::Element, event_type: &str, listener: Self::Listener);
}
