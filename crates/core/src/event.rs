use serde::{Deserialize, Serialize};

use crate::types::{
    BlockedAction, GovernancePolicy, GroupId, HostnamePairRule, Indicator, NetRule, TabId, TabInfo,
    UrlPairRule, WindowId,
};

/// Everything the browser host can tell the engine, as one tagged union so
/// dispatch is an exhaustive match instead of string comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// An agent took control of a grouped tab.
    AgentDetected { tab: TabInfo },
    /// The agent's in-page indicator went away on this tab.
    AgentStopped { tab: TabInfo },
    /// The in-page collaborator denied an element action.
    ActionBlocked {
        tab: TabInfo,
        action_type: String,
        url: String,
    },
    /// The in-page collaborator observed an agent action worth auditing.
    ScreenshotTrigger { tab: TabInfo, trigger: ActionTrigger },
    /// Policy configuration changed.
    PolicyReload { update: PolicyUpdate },
    /// Pre-navigation intercept for a top-level frame.
    TabNavigated { tab_id: TabId, url: String },
    /// Post-navigation URL-change notice.
    TabUrlChanged { tab_id: TabId, url: String },
    /// A tab joined or left a group.
    TabGrouped {
        tab: TabInfo,
        group_id: Option<GroupId>,
    },
    TabRemoved { tab_id: TabId },
    /// The group's session-status indicator was observed (or observed gone).
    GroupUpdated {
        group_id: GroupId,
        indicator: Option<Indicator>,
    },
    GroupRemoved { group_id: GroupId },
    WindowFocusChanged { window_id: WindowId, focused: bool },
}

/// Payload of a `ScreenshotTrigger`: what the agent did on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTrigger {
    /// "click", "input", "scroll", ...
    pub action: String,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub element: Option<serde_json::Value>,
    #[serde(default)]
    pub coordinates: Option<serde_json::Value>,
    #[serde(default)]
    pub input_value: Option<String>,
    /// Overrides for the audited URL/title; the tab snapshot is the fallback.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rules", rename_all = "snake_case")]
pub enum PolicyUpdate {
    HostnamePairRules(Vec<HostnamePairRule>),
    UrlPairRules(Vec<UrlPairRule>),
    BlockedActions(Vec<BlockedAction>),
    Governance(GovernancePolicy),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

/// Wire form of the commands the engine issues back to the host. The engine
/// itself talks to a `Host` trait; this enum is how a remote host adapter
/// frames those calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    CaptureTab { tab_id: TabId, capture_id: String },
    StopAgent { tab_id: TabId },
    ShowBadge {
        text: String,
        color: String,
        duration_ms: u64,
    },
    ShowNotice {
        tab_id: TabId,
        title: String,
        message: String,
        severity: NoticeSeverity,
    },
    UngroupTab { tab_id: TabId },
    UpdateNetRules { add: Vec<NetRule>, remove: Vec<u32> },
    RestoreIndicator {
        group_id: GroupId,
        indicator: Indicator,
    },
}
