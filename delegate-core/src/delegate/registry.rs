//! Registry: event type -> ordered (target key -> handler) table
//!
//! - one inner table per event type, insertion-ordered, unique keys
//! - re-registering a key replaces its handler and keeps its position
//! - an event type disappears as soon as its last key is removed
//! - dispatch works on a snapshot, never on the live table

use std::rc::Rc;

use compact_str::CompactString;
use indexmap::IndexMap;
use smallvec::SmallVec;

use super::target::TargetKey;
use crate::dom::host::Host;

/// Delegated handler for one target key.
pub type Handler<Ev> = Rc<dyn Fn(&Ev)>;

/// Per event type dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Native listener invocations for this type.
    pub dispatched: u64,

    /// Invocations where a handler matched and ran.
    pub handled: u64,
}

pub(crate) struct Registration<H: Host> {
    pub key: TargetKey<H::Element>,
    pub handler: Handler<H::Event>,
}

impl<H: Host> Clone for Registration<H> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            handler: Rc::clone(&self.handler),
        }
    }
}

/// Immutable copy of one event type's table, taken before handlers run.
pub(crate) type Snapshot<H> = SmallVec<[Registration<H>; 4]>;

struct TypeEntry<H: Host> {
    registrations: Snapshot<H>,
    stats: DispatchStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registered {
    /// First registration for this event type.
    NewType,
    Added,
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removed {
    NotFound,
    Removed,
    /// The key was the last one; the event type is gone from the registry.
    LastForType,
}

pub(crate) struct Registry<H: Host> {
    types: IndexMap<CompactString, TypeEntry<H>>,
}

impl<H: Host> Registry<H> {
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        key: TargetKey<H::Element>,
        event_type: &str,
        handler: Handler<H::Event>,
    ) -> Registered {
        let mut outcome = Registered::Added;

        let entry = self
            .types
            .entry(CompactString::from(event_type))
            .or_insert_with(|| {
                outcome = Registered::NewType;
                TypeEntry {
                    registrations: SmallVec::new(),
                    stats: DispatchStats::default(),
                }
            });

        match entry
            .registrations
            .iter_mut()
            .find(|registration: &&mut Registration<H>| registration.key == key)
        {
            Some(existing) => {
                existing.handler = handler;
                Registered::Replaced
            }
            None => {
                entry.registrations.push(Registration { key, handler });
                outcome
            }
        }
    }

    pub fn remove(&mut self, key: &TargetKey<H::Element>, event_type: &str) -> Removed {
        let Some(entry) = self.types.get_mut(event_type) else {
            return Removed::NotFound;
        };

        let Some(position) = entry
            .registrations
            .iter()
            .position(|registration: &Registration<H>| &registration.key == key)
        else {
            return Removed::NotFound;
        };

        entry.registrations.remove(position);

        if entry.registrations.is_empty() {
            self.types.shift_remove(event_type);
            Removed::LastForType
        } else {
            Removed::Removed
        }
    }

    pub fn snapshot(&self, event_type: &str) -> Option<Snapshot<H>> {
        self.types
            .get(event_type)
            .map(|entry: &TypeEntry<H>| entry.registrations.clone())
    }

    pub fn record(&mut self, event_type: &str, handled: bool) {
        if let Some(entry) = self.types.get_mut(event_type) {
            entry.stats.dispatched += 1;
            if handled {
                entry.stats.handled += 1;
            }
        }
    }

    pub fn event_types(&self) -> impl Iterator<Item = &CompactString> {
        self.types.keys()
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.types
            .get(event_type)
            .map_or(0, |entry: &TypeEntry<H>| entry.registrations.len())
    }

    pub fn stats(&self, event_type: &str) -> Option<DispatchStats> {
        self.types
            .get(event_type)
            .map(|entry: &TypeEntry<H>| entry.stats)
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }
}

/// First registration whose key matches `target`, in insertion order.
pub(crate) fn first_match<'a, H: Host>(
    host: &H,
    snapshot: &'a [Registration<H>],
    target: &H::Element,
) -> Option<&'a Registration<H>> {
    snapshot
        .iter()
        .find(|registration: &&Registration<H>| registration.key.matches(host, target))
}
