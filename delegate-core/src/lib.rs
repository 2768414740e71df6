pub mod error;

pub mod config;

#[cfg(not(target_arch = "wasm32"))]
pub mod logging;

pub mod dom {
    pub mod host;
    pub use host::{DomEvent, Host, ListenerFn};

    pub mod selector;
    pub use selector::{Selector, SelectorSubject};

    pub mod memory;
    pub use memory::{ListenerId, MemoryDocument, MemoryEvent, NodeId};

    #[cfg(feature = "web")]
    pub mod web;
    #[cfg(feature = "web")]
    pub use web::{WebEvent, WebHost, WebListener};
}

pub mod delegate {
    pub mod target;
    pub use target::TargetKey;

    pub mod registry;
    pub use registry::DispatchStats;

    pub mod delegator;
    pub use delegator::Delegator;
}

pub use config::{Config, DelegatorConfig};
pub use delegate::{Delegator, DispatchStats, TargetKey};
pub use error::DelegateError;
