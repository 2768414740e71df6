//! WebHost: `web-sys` backed host for wasm32 targets (feature `web`)
//!
//! Listeners are installed with `capture: true`; the `Closure` is owned by the
//! returned [`WebListener`] and freed when the listener is removed.

use std::borrow::Cow;

use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{AddEventListenerOptions, Element, Event};

use super::host::{DomEvent, Host, ListenerFn};
use crate::error::DelegateError;

/// Browser event wrapper.
#[derive(Debug, Clone)]
pub struct WebEvent(pub Event);

impl DomEvent for WebEvent {
    type Element = Element;

    fn target(&self) -> Option<Element> {
        self.0
            .target()
            .and_then(|target| target.dyn_into::<Element>().ok())
    }

    fn event_type(&self) -> Cow<'_, str> {
        Cow::Owned(self.0.type_())
    }

    fn prevent_default(&self) {
        self.0.prevent_default();
    }
}

/// Native listener attached to a root element.
pub struct WebListener {
    closure: Closure<dyn Fn(Event)>,
}

impl std::fmt::Debug for WebListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebListener").finish_non_exhaustive()
    }
}

/// Host over the browser DOM.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebHost;

impl Host for WebHost {
    type Element = Element;

    type Event = WebEvent;

    type Listener = WebListener;

    fn matches(&self, element: &Element, selector: &str) -> bool {
        element.matches(selector).unwrap_or_else(|e| {
            warn!("Selector '{}' rejected by the browser: {:?}", selector, e);
            false
        })
    }

    fn add_listener(
        &self,
        root: &Element,
        event_type: &str,
        callback: ListenerFn<WebEvent>,
    ) -> Result<WebListener, DelegateError> {
        let closure = Closure::<dyn Fn(Event)>::new(move |event: Event| {
            callback(&WebEvent(event));
        });

        let options = AddEventListenerOptions::new();
        options.set_capture(true);

        root.add_event_listener_with_callback_and_add_event_listener_options(
            event_type,
            closure.as_ref().unchecked_ref(),
            &options,
        )
        .map_err(|e| DelegateError::host("addEventListener", format!("{e:?}")))?;

        Ok(WebListener { closure })
    }

    fn remove_listener(&self, root: &Element, event_type: &str, listener: WebListener) {
        if let Err(e) = root.remove_event_listener_with_callback_and_bool(
            event_type,
            listener.closure.as_ref().unchecked_ref(),
            true,
        ) {
            warn!("removeEventListener({}) failed: {:?}", event_type, e);
        }
    }
}
