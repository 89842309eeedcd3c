use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host-assigned identifier of a single view (browser tab).
pub type TabId = i64;
/// Host-assigned identifier of a view group (tab group).
pub type GroupId = i64;
/// Host-assigned identifier of a window.
pub type WindowId = i64;
/// Session ids are millisecond epoch timestamps, kept monotonic by the
/// registry so rapid creation never collides.
pub type SessionId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

/// One tracked agent engagement with a view group, bounded by start/end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub group_id: GroupId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between start and end, rounded; set when the session ends.
    pub duration: Option<i64>,
    /// The single tab this session claims within its group.
    pub tab_id: TabId,
    pub tab_title: String,
    pub tab_url: String,
    pub screenshot_count: u32,
    pub status: SessionStatus,
    /// Distinct URLs in first-visit order. Only grows while active.
    pub visited_urls: Vec<String>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Transient record that a specific tab is under active agent control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    pub session_id: SessionId,
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReason {
    AgentEvent,
    PageRead,
}

/// Free-form detail block attached to an audit entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    #[serde(default)]
    pub element: Option<serde_json::Value>,
    #[serde(default)]
    pub coordinates: Option<serde_json::Value>,
    #[serde(default)]
    pub input_value: Option<String>,
    /// All values collected in one debounce window, oldest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_values: Option<Vec<String>>,
    pub action_type: String,
    /// For `<action>_result` entries: id of the matching pre-action entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}

/// One persisted record of an observed agent action or page read.
/// Immutable once written; ordering is the order of enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub session_id: SessionId,
    pub tab_id: TabId,
    pub url: String,
    pub title: String,
    pub reason: AuditReason,
    pub timestamp: DateTime<Utc>,
    /// Opaque captured-image reference supplied by the host, if any.
    #[serde(default)]
    pub data_url: Option<String>,
    pub event_type: String,
    pub event_details: EventDetails,
}

/// Hostname-pair isolation rule. Either side may be the empty string,
/// meaning "any hostname". Serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostnamePairRule(pub String, pub String);

/// Exact URL-pair isolation rule; no wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPairRule(pub String, pub String);

/// Element-action constraint enforced by the in-page collaborator. Persisted
/// and reloadable here; the engine only reacts to the resulting
/// `ActionBlocked` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedAction {
    pub action_type: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Governance policy driving the network-rule synchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernancePolicy {
    #[serde(default)]
    pub disallow_clickable_urls: bool,
    #[serde(default)]
    pub disallow_query_params: bool,
}

/// A declarative network-blocking rule as installed into the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetRule {
    pub id: u32,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
}

/// Abstract form of the session-status marker the host UI shows on a group
/// (the original surfaced these as ✅ / ⌛ / 🔔 title glyphs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Done,
    Waiting,
    Attention,
}

/// Snapshot of a tab as reported by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub active: bool,
}

/// Hostname of a URL, if it parses. Mirrors `new URL(url).hostname`.
pub fn hostname(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
