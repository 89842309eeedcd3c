pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod types;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use event::{ActionTrigger, HostCommand, HostEvent, NoticeSeverity, PolicyUpdate};
pub use paths::Paths;
pub use types::{
    Activation, AuditEntry, AuditReason, BlockedAction, EventDetails, GovernancePolicy, GroupId,
    HostnamePairRule, Indicator, NetRule, Session, SessionId, SessionStatus, TabId, TabInfo,
    UrlPairRule, WindowId,
};
