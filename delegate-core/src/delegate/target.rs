//! TargetKey: what a delegated handler is registered for.

use compact_str::CompactString;

use crate::dom::host::Host;

/// Either one exact element or every element matching a selector.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetKey<E> {
    /// Matches only this element (identity).
    Exact(E),

    /// Matches any target the host's selector predicate accepts.
    Selector(CompactString),
}

impl<E: PartialEq> TargetKey<E> {
    pub fn exact(element: E) -> Self {
        Self::Exact(element)
    }

    pub fn selector(selector: impl Into<CompactString>) -> Self {
        Self::Selector(selector.into())
    }

    /// Test the key against the event's exact target; ancestors are not consulted.
    pub fn matches<H>(&self, host: &H, target: &E) -> bool
    where
        H: Host<Element = E>,
    {
        match self {
            Self::Exact(element) => element == target,
            Self::Selector(selector) => host.matches(target, selector),
        }
    }
}

impl<E> From<&str> for TargetKey<E> {
    fn from(selector: &str) -> Self {
        Self::Selector(CompactString::from(selector))
    }
}

impl<E> From<String> for TargetKey<E> {
    fn from(selector: String) -> Self {
        Self::Selector(CompactString::from(selector))
    }
}

impl<E> From<CompactString> for TargetKey<E> {
    fn from(selector: CompactString) -> Self {
        Self::Selector(selector)
    }
}
