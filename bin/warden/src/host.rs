use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use warden_core::{
    Error, GroupId, HostCommand, HostEvent, Indicator, NetRule, NoticeSeverity, Result, TabId,
    TabInfo, WindowId,
};
use warden_engine::Host;

/// Host adapter speaking JSON lines: events arrive on stdin (fed in by the
/// run command), engine commands leave on stdout. Tab, group, and focus
/// state is mirrored from the event stream so queries never need a
/// round trip.
pub struct StdioHost {
    tabs: Mutex<HashMap<TabId, TabInfo>>,
    groups: Mutex<HashSet<GroupId>>,
    unfocused_windows: Mutex<HashSet<WindowId>>,
    installed_rules: Mutex<HashSet<u32>>,
    out: Mutex<tokio::io::Stdout>,
}

impl StdioHost {
    pub fn new() -> Self {
        Self {
            tabs: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashSet::new()),
            unfocused_windows: Mutex::new(HashSet::new()),
            installed_rules: Mutex::new(HashSet::new()),
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn upsert_tab(&self, tab: &TabInfo) {
        if let Some(group_id) = tab.group_id {
            self.groups.lock().await.insert(group_id);
        }
        self.tabs.lock().await.insert(tab.id, tab.clone());
    }

    /// Fold an inbound event into the mirrored browser state. Called by the
    /// event reader before the engine sees the event.
    pub async fn observe(&self, event: &HostEvent) {
        match event {
            HostEvent::AgentDetected { tab }
            | HostEvent::AgentStopped { tab }
            | HostEvent::ActionBlocked { tab, .. }
            | HostEvent::ScreenshotTrigger { tab, .. } => self.upsert_tab(tab).await,
            HostEvent::TabNavigated { tab_id, url }
            | HostEvent::TabUrlChanged { tab_id, url } => {
                if let Some(tab) = self.tabs.lock().await.get_mut(tab_id) {
                    tab.url = url.clone();
                }
            }
            HostEvent::TabGrouped { tab, group_id } => {
                let mut updated = tab.clone();
                updated.group_id = *group_id;
                self.upsert_tab(&updated).await;
            }
            HostEvent::TabRemoved { tab_id } => {
                self.tabs.lock().await.remove(tab_id);
            }
            HostEvent::GroupUpdated { group_id, .. } => {
                self.groups.lock().await.insert(*group_id);
            }
            HostEvent::GroupRemoved { group_id } => {
                self.groups.lock().await.remove(group_id);
                for tab in self.tabs.lock().await.values_mut() {
                    if tab.group_id == Some(*group_id) {
                        tab.group_id = None;
                    }
                }
            }
            HostEvent::WindowFocusChanged { window_id, focused } => {
                let mut unfocused = self.unfocused_windows.lock().await;
                if *focused {
                    unfocused.remove(window_id);
                } else {
                    unfocused.insert(*window_id);
                }
            }
            HostEvent::PolicyReload { .. } => {}
        }
    }

    async fn send(&self, command: &HostCommand) -> Result<()> {
        let mut line = serde_json::to_string(command)?;
        line.push('\n');
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

impl Default for StdioHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Host for StdioHost {
    async fn tab(&self, tab_id: TabId) -> Result<TabInfo> {
        self.tabs
            .lock()
            .await
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("tab {tab_id}")))
    }

    async fn tabs_in_group(&self, group_id: GroupId) -> Result<Vec<TabInfo>> {
        Ok(self
            .tabs
            .lock()
            .await
            .values()
            .filter(|t| t.group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn group_exists(&self, group_id: GroupId) -> Result<bool> {
        Ok(self.groups.lock().await.contains(&group_id))
    }

    async fn ungroup_tab(&self, tab_id: TabId) -> Result<()> {
        if let Some(tab) = self.tabs.lock().await.get_mut(&tab_id) {
            tab.group_id = None;
        }
        self.send(&HostCommand::UngroupTab { tab_id }).await
    }

    async fn capture_tab(&self, tab_id: TabId) -> Result<String> {
        let capture_id = Uuid::new_v4().to_string();
        self.send(&HostCommand::CaptureTab {
            tab_id,
            capture_id: capture_id.clone(),
        })
        .await?;
        Ok(format!("capture://{capture_id}"))
    }

    async fn run_stop_script(&self, tab_id: TabId) -> Result<bool> {
        self.send(&HostCommand::StopAgent { tab_id }).await?;
        // The host clicks the control asynchronously; report it as found.
        Ok(true)
    }

    async fn show_badge(&self, text: &str, color: &str, duration_ms: u64) -> Result<()> {
        self.send(&HostCommand::ShowBadge {
            text: text.to_string(),
            color: color.to_string(),
            duration_ms,
        })
        .await
    }

    async fn show_notice(
        &self,
        tab_id: TabId,
        title: &str,
        message: &str,
        severity: NoticeSeverity,
    ) -> Result<()> {
        self.send(&HostCommand::ShowNotice {
            tab_id,
            title: title.to_string(),
            message: message.to_string(),
            severity,
        })
        .await
    }

    async fn installed_net_rules(&self) -> Result<Vec<u32>> {
        Ok(self.installed_rules.lock().await.iter().copied().collect())
    }

    async fn update_net_rules(&self, add: Vec<NetRule>, remove: Vec<u32>) -> Result<()> {
        {
            let mut installed = self.installed_rules.lock().await;
            for rule in &add {
                installed.insert(rule.id);
            }
            for id in &remove {
                installed.remove(id);
            }
        }
        self.send(&HostCommand::UpdateNetRules { add, remove }).await
    }

    async fn group_window_focused(&self, group_id: GroupId) -> Result<bool> {
        let window_id = {
            let tabs = self.tabs.lock().await;
            tabs.values()
                .find(|t| t.group_id == Some(group_id))
                .map(|t| t.window_id)
        };
        let Some(window_id) = window_id else {
            debug!(group_id, "No tab known for group, assuming focused");
            return Ok(true);
        };
        Ok(!self.unfocused_windows.lock().await.contains(&window_id))
    }

    async fn restore_indicator(&self, group_id: GroupId, indicator: Indicator) -> Result<()> {
        self.send(&HostCommand::RestoreIndicator {
            group_id,
            indicator,
        })
        .await
    }
}
