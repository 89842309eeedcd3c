use async_trait::async_trait;
use warden_core::{GroupId, Indicator, NetRule, NoticeSeverity, Result, TabId, TabInfo};

/// Commands and queries the engine issues against the browser host. Every
/// method is best-effort: a failed call is logged at the call site and the
/// handler moves on, it never brings the engine down.
#[async_trait]
pub trait Host: Send + Sync {
    /// Current snapshot of a tab; `Err` when the tab no longer exists.
    async fn tab(&self, tab_id: TabId) -> Result<TabInfo>;

    async fn tabs_in_group(&self, group_id: GroupId) -> Result<Vec<TabInfo>>;

    async fn group_exists(&self, group_id: GroupId) -> Result<bool>;

    async fn ungroup_tab(&self, tab_id: TabId) -> Result<()>;

    /// Capture a still image of the tab, returning an opaque reference.
    async fn capture_tab(&self, tab_id: TabId) -> Result<String>;

    /// Inject the one-shot stop script. `Ok(true)` means the stop control
    /// was found and clicked; `Ok(false)` means it was not present yet.
    async fn run_stop_script(&self, tab_id: TabId) -> Result<bool>;

    /// Transient toolbar badge; the host clears it after `duration_ms`.
    async fn show_badge(&self, text: &str, color: &str, duration_ms: u64) -> Result<()>;

    async fn show_notice(
        &self,
        tab_id: TabId,
        title: &str,
        message: &str,
        severity: NoticeSeverity,
    ) -> Result<()>;

    /// Ids of the network-blocking rules currently installed.
    async fn installed_net_rules(&self) -> Result<Vec<u32>>;

    /// One atomic add/remove of network-blocking rules.
    async fn update_net_rules(&self, add: Vec<NetRule>, remove: Vec<u32>) -> Result<()>;

    /// Whether the window showing this group currently holds input focus.
    async fn group_window_focused(&self, group_id: GroupId) -> Result<bool>;

    /// Put the session-status indicator back on a group.
    async fn restore_indicator(&self, group_id: GroupId, indicator: Indicator) -> Result<()>;
}
