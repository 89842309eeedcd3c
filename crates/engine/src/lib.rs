//! Session and navigation governance for browser agents: tracks agent
//! sessions per tab group, enforces context-isolation rules on navigation,
//! audits observed agent actions, and keeps host-side network rules in sync
//! with policy.

pub mod activation;
pub mod debounce;
pub mod engine;
pub mod governance;
pub mod host;
pub mod netrules;
pub mod registry;

pub use activation::ActivationTracker;
pub use debounce::{InputDebouncer, PendingInput};
pub use engine::GovernanceEngine;
pub use governance::{evaluate, matches_hostname, Verdict};
pub use host::Host;
pub use registry::SessionRegistry;
