use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use warden_core::types::hostname;
use warden_core::{
    ActionTrigger, Activation, AuditEntry, AuditReason, BlockedAction, EngineConfig, EventDetails,
    GovernancePolicy, GroupId, HostEvent, HostnamePairRule, Indicator, NoticeSeverity,
    PolicyUpdate, Result, SessionId, SessionStatus, TabId, TabInfo, UrlPairRule,
};
use warden_storage::{keys, AuditWriteQueue, KeyValueStore, SessionArchive};

use crate::activation::ActivationTracker;
use crate::debounce::{InputDebouncer, PendingInput};
use crate::governance::{evaluate, Verdict};
use crate::host::Host;
use crate::netrules;
use crate::registry::SessionRegistry;

const BADGE_BLOCKED: &str = "⛔";
const BADGE_COLOR_BLOCKED: &str = "#FF0000";
const NOTICE_TITLE_DENIED: &str = "Agent Mode Denied";
const NOTICE_TITLE_ACTION: &str = "Action Blocked";

/// The governance engine: session registry, activation tracking, navigation
/// policy enforcement, audit persistence, and input coalescing behind one
/// event-driven loop. All state is owned here; handlers mutate it
/// synchronously between suspension points.
pub struct GovernanceEngine {
    config: EngineConfig,
    host: Arc<dyn Host>,
    store: Arc<dyn KeyValueStore>,
    archive: SessionArchive,
    registry: SessionRegistry,
    tracker: ActivationTracker,
    debouncer: InputDebouncer,
    audit: AuditWriteQueue,
    hostname_rules: Vec<HostnamePairRule>,
    url_pair_rules: Vec<UrlPairRule>,
    blocked_actions: Vec<BlockedAction>,
    policy: GovernancePolicy,
    /// Last indicator observed per group, for the focus heuristic.
    indicators: HashMap<GroupId, Indicator>,
    flush_rx: Option<mpsc::UnboundedReceiver<TabId>>,
    counts_rx: Option<mpsc::UnboundedReceiver<(SessionId, u32)>>,
    _audit_worker: JoinHandle<()>,
}

impl GovernanceEngine {
    pub fn new(config: EngineConfig, host: Arc<dyn Host>, store: Arc<dyn KeyValueStore>) -> Self {
        let archive = SessionArchive::new(store.clone());
        let (counts_tx, counts_rx) = mpsc::unbounded_channel();
        let (audit, audit_worker) =
            AuditWriteQueue::spawn(store.clone(), config.max_audit_entries, counts_tx);
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let debouncer =
            InputDebouncer::new(Duration::from_millis(config.input_debounce_ms), flush_tx);

        Self {
            config,
            host,
            store,
            archive,
            registry: SessionRegistry::new(audit.clone()),
            tracker: ActivationTracker::new(),
            debouncer,
            audit,
            hostname_rules: Vec::new(),
            url_pair_rules: Vec::new(),
            blocked_actions: Vec::new(),
            policy: GovernancePolicy::default(),
            indicators: HashMap::new(),
            flush_rx: Some(flush_rx),
            counts_rx: Some(counts_rx),
            _audit_worker: audit_worker,
        }
    }

    /// Restore persisted policy and sessions. Sessions still marked active
    /// whose tab or group disappeared while we were down are flipped to
    /// ended and written back.
    pub async fn load_state(&mut self) -> Result<()> {
        self.load_policies().await?;

        if let Err(e) = netrules::sync(self.host.as_ref(), &self.policy).await {
            warn!(error = %e, "Failed to sync network rules at startup");
        }

        let mut all = self.archive.load_all().await?;
        let mut restored = 0;
        for session in &mut all {
            if !session.is_active() {
                continue;
            }
            if self.session_still_live(session.tab_id, session.group_id).await {
                self.registry.restore(session.clone());
                restored += 1;
            } else {
                session.status = SessionStatus::Ended;
                session.end_time = Some(Utc::now());
            }
        }
        let total = all.len();
        self.audit.replace_sessions(all).await?;
        info!(restored, total, "Session archive reconciled");
        Ok(())
    }

    async fn session_still_live(&self, tab_id: TabId, group_id: GroupId) -> bool {
        let tab_ok = match self.host.tab(tab_id).await {
            Ok(tab) => tab.group_id == Some(group_id),
            Err(_) => false,
        };
        tab_ok && self.host.group_exists(group_id).await.unwrap_or(false)
    }

    async fn load_policies(&mut self) -> Result<()> {
        let stored = self
            .store
            .get(&[
                keys::HOSTNAME_PAIR_RULES,
                keys::URL_PAIR_RULES,
                keys::BLOCKED_ACTIONS,
                keys::GOVERNANCE_POLICY,
            ])
            .await?;

        if let Some(value) = stored.get(keys::HOSTNAME_PAIR_RULES) {
            match serde_json::from_value(value.clone()) {
                Ok(rules) => self.hostname_rules = rules,
                Err(e) => debug!(error = %e, "Ignoring malformed hostname pair rules"),
            }
        }
        if let Some(value) = stored.get(keys::URL_PAIR_RULES) {
            match serde_json::from_value(value.clone()) {
                Ok(rules) => self.url_pair_rules = rules,
                Err(e) => debug!(error = %e, "Ignoring malformed URL pair rules"),
            }
        }
        if let Some(value) = stored.get(keys::BLOCKED_ACTIONS) {
            match serde_json::from_value(value.clone()) {
                Ok(actions) => self.blocked_actions = actions,
                Err(e) => debug!(error = %e, "Ignoring malformed blocked actions"),
            }
        }
        if let Some(value) = stored.get(keys::GOVERNANCE_POLICY) {
            match serde_json::from_value(value.clone()) {
                Ok(policy) => self.policy = policy,
                Err(e) => debug!(error = %e, "Ignoring malformed governance policy"),
            }
        }
        Ok(())
    }

    /// Drive the engine until shutdown: host events, debounce flush ticks,
    /// and screenshot-count updates from the audit queue.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HostEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let (Some(mut flush_rx), Some(mut counts_rx)) =
            (self.flush_rx.take(), self.counts_rx.take())
        else {
            error!("Engine run loop started twice");
            return;
        };

        info!("Governance engine started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                Some(tab_id) = flush_rx.recv() => {
                    self.flush_input(tab_id).await;
                }
                Some((session_id, count)) = counts_rx.recv() => {
                    self.registry.set_screenshot_count(session_id, count);
                }
                _ = shutdown.recv() => {
                    info!("Governance engine shutting down");
                    break;
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::AgentDetected { tab } => self.on_agent_detected(tab).await,
            HostEvent::AgentStopped { tab } => self.on_agent_stopped(tab),
            HostEvent::ActionBlocked {
                tab,
                action_type,
                url,
            } => self.on_action_blocked(tab, action_type, url).await,
            HostEvent::ScreenshotTrigger { tab, trigger } => {
                self.on_screenshot_trigger(tab, trigger)
            }
            HostEvent::PolicyReload { update } => self.on_policy_reload(update).await,
            HostEvent::TabNavigated { tab_id, url } => self.on_tab_navigated(tab_id, url).await,
            HostEvent::TabUrlChanged { tab_id, url } => self.on_tab_url_changed(tab_id, url).await,
            HostEvent::TabGrouped { tab, group_id } => self.on_tab_grouped(tab, group_id).await,
            HostEvent::TabRemoved { tab_id } => self.on_tab_removed(tab_id).await,
            HostEvent::GroupUpdated {
                group_id,
                indicator,
            } => self.on_group_updated(group_id, indicator).await,
            HostEvent::GroupRemoved { group_id } => {
                self.end_session(group_id, "tab_group_removed").await;
            }
            // Focus bookkeeping lives in the host adapter; the engine asks
            // via group_window_focused when it matters.
            HostEvent::WindowFocusChanged { .. } => {}
        }
    }

    async fn on_agent_detected(&mut self, tab: TabInfo) {
        let Some(group_id) = tab.group_id else {
            return;
        };

        let (session, created) = match self.registry.get_or_create(group_id, &tab).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, group_id, "Failed to create session");
                return;
            }
        };
        if created {
            self.claim_group(group_id, session.tab_id).await;
        }

        let verdict = evaluate(
            &tab.url,
            &session.visited_urls,
            &self.hostname_rules,
            &self.url_pair_rules,
        );
        if let Verdict::Blocked { reason, .. } = verdict {
            self.deny_navigation(tab.id, group_id, &reason).await;
            return;
        }

        self.tracker.start(tab.id, &session);
        self.record_page_read(group_id, tab.id, &tab.url, &tab.title)
            .await;
    }

    fn on_agent_stopped(&mut self, tab: TabInfo) {
        let Some(group_id) = tab.group_id else {
            return;
        };
        // Activation tracking requires a session; stray stops are no-ops.
        if self.registry.get(group_id).is_some() {
            self.tracker.stop(tab.id);
        }
    }

    async fn on_action_blocked(&mut self, tab: TabInfo, action_type: String, url: String) {
        warn!(
            tab_id = tab.id,
            action_type, url, "Element action blocked by policy"
        );
        self.stop_agent(tab.id).await;
        self.tracker.stop(tab.id);
        self.show_blocked_badge().await;

        let host_name = hostname(&url).unwrap_or_else(|| "this page".to_string());
        let message =
            format!("Agent attempted to {action_type} on a restricted element at {host_name}");
        if let Err(e) = self
            .host
            .show_notice(tab.id, NOTICE_TITLE_ACTION, &message, NoticeSeverity::Error)
            .await
        {
            warn!(error = %e, tab_id = tab.id, "Failed to show in-page notice");
        }
    }

    fn on_screenshot_trigger(&mut self, tab: TabInfo, trigger: ActionTrigger) {
        let mut activation = self.tracker.get(tab.id);

        // A tab inside an active session's group may act before an explicit
        // start signal; adopt it.
        if activation.is_none() {
            if let Some(group_id) = tab.group_id {
                if let Some(session) = self.registry.get(group_id).filter(|s| s.is_active()) {
                    let session = session.clone();
                    self.tracker.start(tab.id, &session);
                    activation = self.tracker.get(tab.id);
                }
            }
        }
        let Some(activation) = activation else {
            return;
        };

        match trigger.action.as_str() {
            "input" => {
                self.debouncer.push(
                    tab.id,
                    PendingInput {
                        element: trigger.element,
                        input_value: trigger.input_value,
                        timestamp: Utc::now(),
                    },
                );
            }
            "click" => self.spawn_click_capture(tab.id, trigger, activation),
            _ => self.spawn_result_capture(tab.id, trigger, activation),
        }
    }

    /// Click actions get two entries: the page as the agent saw it, and the
    /// settled result referencing the first entry's id.
    fn spawn_click_capture(&self, tab_id: TabId, trigger: ActionTrigger, activation: Activation) {
        let host = self.host.clone();
        let audit = self.audit.clone();
        let settle = Duration::from_millis(self.config.click_settle_ms);

        tokio::spawn(async move {
            let Ok(current) = host.tab(tab_id).await else {
                return;
            };
            let image = match host.capture_tab(tab_id).await {
                Ok(image) => image,
                Err(e) => {
                    warn!(error = %e, tab_id, "Capture failed, skipping click audit");
                    return;
                }
            };

            let event_type = trigger.event_type.clone().unwrap_or_else(|| "unknown".to_string());
            let url = trigger.url.clone().unwrap_or_else(|| current.url.clone());
            let title = trigger.title.clone().unwrap_or_else(|| current.title.clone());
            let pre_entry = agent_event_entry(
                &activation,
                tab_id,
                &url,
                &title,
                Some(image),
                &event_type,
                EventDetails {
                    element: trigger.element.clone(),
                    coordinates: trigger.coordinates.clone(),
                    input_value: trigger.input_value.clone(),
                    input_values: None,
                    action_type: trigger.action.clone(),
                    action_id: None,
                },
            );
            let action_id = audit
                .enqueue(pre_entry, activation)
                .await
                .ok()
                .flatten();

            tokio::time::sleep(settle).await;

            let Ok(result_tab) = host.tab(tab_id).await else {
                return;
            };
            let image = match host.capture_tab(tab_id).await {
                Ok(image) => image,
                Err(e) => {
                    warn!(error = %e, tab_id, "Result capture failed");
                    return;
                }
            };
            let result_entry = agent_event_entry(
                &activation,
                tab_id,
                &result_tab.url,
                &result_tab.title,
                Some(image),
                &event_type,
                EventDetails {
                    action_type: format!("{}_result", trigger.action),
                    action_id,
                    ..Default::default()
                },
            );
            let _ = audit.enqueue(result_entry, activation);
        });
    }

    /// Everything that is neither a click nor typed input gets one settled
    /// result entry.
    fn spawn_result_capture(&self, tab_id: TabId, trigger: ActionTrigger, activation: Activation) {
        let host = self.host.clone();
        let audit = self.audit.clone();
        let settle = Duration::from_millis(self.config.capture_settle_ms);

        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let Ok(current) = host.tab(tab_id).await else {
                return;
            };
            let image = match host.capture_tab(tab_id).await {
                Ok(image) => image,
                Err(e) => {
                    warn!(error = %e, tab_id, "Capture failed, skipping audit entry");
                    return;
                }
            };
            let event_type = trigger.event_type.clone().unwrap_or_else(|| "unknown".to_string());
            let url = trigger.url.clone().unwrap_or_else(|| current.url.clone());
            let title = trigger.title.clone().unwrap_or_else(|| current.title.clone());
            let entry = agent_event_entry(
                &activation,
                tab_id,
                &url,
                &title,
                Some(image),
                &event_type,
                EventDetails {
                    element: trigger.element.clone(),
                    coordinates: trigger.coordinates.clone(),
                    action_type: format!("{}_result", trigger.action),
                    ..Default::default()
                },
            );
            let _ = audit.enqueue(entry, activation);
        });
    }

    /// The quiet period for a tab elapsed: commit everything typed since the
    /// last flush as one entry.
    pub(crate) async fn flush_input(&mut self, tab_id: TabId) {
        let Some(inputs) = self.debouncer.take(tab_id) else {
            return;
        };
        let Some(activation) = self.tracker.get(tab_id) else {
            debug!(tab_id, "Dropping buffered input, activation is gone");
            return;
        };

        let input_values: Vec<String> = inputs
            .iter()
            .filter_map(|i| i.input_value.clone())
            .collect();
        let host = self.host.clone();
        let audit = self.audit.clone();
        let settle = Duration::from_millis(self.config.capture_settle_ms);

        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let Ok(current) = host.tab(tab_id).await else {
                return;
            };
            let image = match host.capture_tab(tab_id).await {
                Ok(image) => image,
                Err(e) => {
                    warn!(error = %e, tab_id, "Capture failed, dropping aggregated input");
                    return;
                }
            };
            let entry = agent_event_entry(
                &activation,
                tab_id,
                &current.url,
                &current.title,
                Some(image),
                "input",
                EventDetails {
                    input_values: Some(input_values),
                    action_type: "input_result".to_string(),
                    ..Default::default()
                },
            );
            let _ = audit.enqueue(entry, activation);
        });
    }

    async fn on_policy_reload(&mut self, update: PolicyUpdate) {
        match update {
            PolicyUpdate::HostnamePairRules(rules) => {
                info!(count = rules.len(), "Hostname pair rules reloaded");
                self.persist_policy(keys::HOSTNAME_PAIR_RULES, &rules).await;
                self.hostname_rules = rules;
            }
            PolicyUpdate::UrlPairRules(rules) => {
                info!(count = rules.len(), "URL pair rules reloaded");
                self.persist_policy(keys::URL_PAIR_RULES, &rules).await;
                self.url_pair_rules = rules;
            }
            PolicyUpdate::BlockedActions(actions) => {
                info!(count = actions.len(), "Blocked action rules reloaded");
                self.persist_policy(keys::BLOCKED_ACTIONS, &actions).await;
                self.blocked_actions = actions;
            }
            PolicyUpdate::Governance(policy) => {
                info!(
                    disallow_clickable_urls = policy.disallow_clickable_urls,
                    disallow_query_params = policy.disallow_query_params,
                    "Governance policy reloaded"
                );
                self.persist_policy(keys::GOVERNANCE_POLICY, &policy).await;
                self.policy = policy;
                if let Err(e) = netrules::sync(self.host.as_ref(), &self.policy).await {
                    warn!(error = %e, "Failed to sync network rules");
                }
            }
        }
    }

    async fn persist_policy<T: serde::Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, key, "Failed to serialize policy");
                return;
            }
        };
        let mut entries = HashMap::new();
        entries.insert(key.to_string(), value);
        if let Err(e) = self.store.set(entries).await {
            warn!(error = %e, key, "Failed to persist policy");
        }
    }

    /// Pre-navigation intercept: evaluate before the page loads.
    async fn on_tab_navigated(&mut self, tab_id: TabId, url: String) {
        let Some(activation) = self.tracker.get(tab_id) else {
            return;
        };
        let Some(session) = self.registry.get(activation.group_id) else {
            return;
        };

        let verdict = evaluate(
            &url,
            &session.visited_urls,
            &self.hostname_rules,
            &self.url_pair_rules,
        );
        if let Verdict::Blocked { reason, .. } = verdict {
            self.deny_navigation(tab_id, activation.group_id, &reason)
                .await;
            return;
        }

        let title = self
            .host
            .tab(tab_id)
            .await
            .map(|t| t.title)
            .unwrap_or_default();
        self.record_page_read(activation.group_id, tab_id, &url, &title)
            .await;
    }

    /// Post-navigation notice: the URL already changed; re-check and record.
    async fn on_tab_url_changed(&mut self, tab_id: TabId, url: String) {
        let Some(activation) = self.tracker.get(tab_id) else {
            return;
        };
        let Some(session) = self.registry.get(activation.group_id) else {
            return;
        };

        let verdict = evaluate(
            &url,
            &session.visited_urls,
            &self.hostname_rules,
            &self.url_pair_rules,
        );
        if let Verdict::Blocked { reason, .. } = verdict {
            self.deny_navigation(tab_id, activation.group_id, &reason)
                .await;
            return;
        }

        if let Err(e) = self.registry.add_visited(activation.group_id, &url).await {
            warn!(error = %e, "Failed to persist visited URL");
        }
    }

    async fn on_tab_grouped(&mut self, tab: TabInfo, group_id: Option<GroupId>) {
        // A session's anchor tab leaving its group ends the session.
        if let Some(anchored) = self.registry.anchored_by_tab(tab.id) {
            let old_group = anchored.group_id;
            if group_id != Some(old_group) {
                self.end_session(old_group, "tab_moved_to_different_group")
                    .await;
            }
        }

        let Some(group_id) = group_id else {
            return;
        };
        let Some(session) = self.registry.get(group_id).cloned() else {
            return;
        };
        if !session.is_active() {
            return;
        }

        // The session owns exactly one tab in its group; evict joiners.
        self.claim_group(group_id, session.tab_id).await;

        if tab.url.is_empty() {
            return;
        }
        let Some(active_tab) = self.tracker.any_in_group(group_id) else {
            return;
        };

        let verdict = evaluate(
            &tab.url,
            &session.visited_urls,
            &self.hostname_rules,
            &self.url_pair_rules,
        );
        if let Verdict::Blocked { reason, .. } = verdict {
            self.deny_navigation(active_tab, group_id, &reason).await;
            return;
        }
        if let Err(e) = self.registry.add_visited(group_id, &tab.url).await {
            warn!(error = %e, "Failed to persist visited URL");
        }
    }

    async fn on_tab_removed(&mut self, tab_id: TabId) {
        self.tracker.stop(tab_id);
        self.debouncer.cancel(tab_id);
        if let Some(session) = self.registry.anchored_by_tab(tab_id) {
            let group_id = session.group_id;
            self.end_session(group_id, "session_tab_closed").await;
        }
    }

    /// The focus heuristic: losing the indicator while the window is focused
    /// means the user dismissed it on purpose; while unfocused it was
    /// accidental and we put it back.
    async fn on_group_updated(&mut self, group_id: GroupId, indicator: Option<Indicator>) {
        let session_active = self
            .registry
            .get(group_id)
            .map(|s| s.is_active())
            .unwrap_or(false);
        if !session_active {
            match indicator {
                Some(current) => {
                    self.indicators.insert(group_id, current);
                }
                None => {
                    self.indicators.remove(&group_id);
                }
            }
            return;
        }

        match (self.indicators.get(&group_id).copied(), indicator) {
            (Some(previous), None) => {
                let focused = self
                    .host
                    .group_window_focused(group_id)
                    .await
                    .unwrap_or(false);
                if focused {
                    self.end_session(group_id, "indicator_cleared_by_user").await;
                } else {
                    debug!(group_id, "Restoring indicator cleared while unfocused");
                    if let Err(e) = self.host.restore_indicator(group_id, previous).await {
                        warn!(error = %e, group_id, "Failed to restore indicator");
                    }
                    // Keep `previous` remembered; the restore will echo back
                    // as another GroupUpdated.
                }
            }
            (_, Some(current)) => {
                self.indicators.insert(group_id, current);
            }
            (None, None) => {}
        }
    }

    /// Common teardown after a blocked navigation or action: stop the agent,
    /// drop the activation, and tell the user why.
    async fn deny_navigation(&mut self, tab_id: TabId, group_id: GroupId, reason: &str) {
        warn!(tab_id, group_id, reason, "Navigation blocked by governance rule");

        self.stop_agent(tab_id).await;
        self.tracker.stop(tab_id);
        self.debouncer.cancel(tab_id);
        self.show_blocked_badge().await;
        if let Err(e) = self
            .host
            .show_notice(tab_id, NOTICE_TITLE_DENIED, reason, NoticeSeverity::Error)
            .await
        {
            warn!(error = %e, tab_id, "Failed to show in-page notice");
        }
    }

    /// Best-effort stop: the control may not be rendered yet, so retry a
    /// bounded number of times, then give up with a log record.
    async fn stop_agent(&self, tab_id: TabId) {
        for attempt in 1..=self.config.stop_retries {
            match self.host.run_stop_script(tab_id).await {
                Ok(true) => return,
                Ok(false) => {
                    if attempt < self.config.stop_retries {
                        tokio::time::sleep(Duration::from_millis(self.config.stop_retry_spacing_ms))
                            .await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, tab_id, "Stop script injection failed");
                    return;
                }
            }
        }
        error!(
            tab_id,
            retries = self.config.stop_retries,
            "Stop control not found, giving up"
        );
    }

    async fn show_blocked_badge(&self) {
        if let Err(e) = self
            .host
            .show_badge(BADGE_BLOCKED, BADGE_COLOR_BLOCKED, self.config.badge_duration_ms)
            .await
        {
            warn!(error = %e, "Failed to show badge");
        }
    }

    async fn end_session(&mut self, group_id: GroupId, reason: &str) {
        match self.registry.end(group_id, reason).await {
            Ok(Some(session)) => {
                self.tracker.clear_group(group_id);
                self.debouncer.cancel(session.tab_id);
                self.indicators.remove(&group_id);
            }
            Ok(None) => {}
            Err(e) => {
                // The in-memory session is gone either way; activations must
                // not outlive it.
                error!(error = %e, group_id, "Failed to persist session end");
                self.tracker.clear_group(group_id);
                self.indicators.remove(&group_id);
            }
        }
    }

    /// Remove every other tab from a group the session claims.
    async fn claim_group(&self, group_id: GroupId, keeper: TabId) {
        let tabs = match self.host.tabs_in_group(group_id).await {
            Ok(tabs) => tabs,
            Err(e) => {
                debug!(error = %e, group_id, "Failed to list group tabs");
                return;
            }
        };
        for tab in tabs.iter().filter(|t| t.id != keeper) {
            if let Err(e) = self.host.ungroup_tab(tab.id).await {
                debug!(error = %e, tab_id = tab.id, "Failed to ungroup tab");
            }
        }
    }

    /// Allowed navigation: record the URL (idempotent) and audit the read.
    async fn record_page_read(&mut self, group_id: GroupId, tab_id: TabId, url: &str, title: &str) {
        if let Err(e) = self.registry.add_visited(group_id, url).await {
            warn!(error = %e, "Failed to persist visited URL");
        }
        let Some(session) = self.registry.get(group_id) else {
            return;
        };
        let activation = Activation {
            session_id: session.id,
            group_id,
        };
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            session_id: session.id,
            tab_id,
            url: url.to_string(),
            title: title.to_string(),
            reason: AuditReason::PageRead,
            timestamp: Utc::now(),
            data_url: None,
            event_type: "page_read".to_string(),
            event_details: EventDetails {
                action_type: "page_read".to_string(),
                ..Default::default()
            },
        };
        let _ = self.audit.enqueue(entry, activation);
    }

    /// Element-action constraints currently in force. The engine persists
    /// and reloads these; enforcement happens in the in-page collaborator,
    /// which reports violations back as `ActionBlocked` events.
    pub fn blocked_actions(&self) -> &[BlockedAction] {
        &self.blocked_actions
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self) -> &ActivationTracker {
        &self.tracker
    }

    #[cfg(test)]
    pub(crate) fn debouncer(&self) -> &InputDebouncer {
        &self.debouncer
    }
}

fn agent_event_entry(
    activation: &Activation,
    tab_id: TabId,
    url: &str,
    title: &str,
    data_url: Option<String>,
    event_type: &str,
    event_details: EventDetails,
) -> AuditEntry {
    AuditEntry {
        id: Uuid::new_v4().to_string(),
        session_id: activation.session_id,
        tab_id,
        url: url.to_string(),
        title: title.to_string(),
        reason: AuditReason::AgentEvent,
        timestamp: Utc::now(),
        data_url,
        event_type: event_type.to_string(),
        event_details,
    }
}
