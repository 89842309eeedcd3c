use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info};
use warden_core::{GroupId, Result, Session, SessionId, SessionStatus, TabId, TabInfo};
use warden_storage::AuditWriteQueue;

/// In-memory registry of active sessions, one per group. Ended sessions are
/// evicted here but stay in the persistent archive. Map mutation happens
/// synchronously between awaits; persistence goes through the audit write
/// queue, the single writer for the session collection.
pub struct SessionRegistry {
    sessions: HashMap<GroupId, Session>,
    queue: AuditWriteQueue,
    last_id: SessionId,
}

impl SessionRegistry {
    pub fn new(queue: AuditWriteQueue) -> Self {
        Self {
            sessions: HashMap::new(),
            queue,
            last_id: 0,
        }
    }

    pub fn get(&self, group_id: GroupId) -> Option<&Session> {
        self.sessions.get(&group_id)
    }

    /// The active session anchored to this tab, if any.
    pub fn anchored_by_tab(&self, tab_id: TabId) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.is_active() && s.tab_id == tab_id)
    }

    /// Millisecond-epoch ids like the original, made collision-proof.
    fn next_id(&mut self) -> SessionId {
        let now = Utc::now().timestamp_millis();
        self.last_id = now.max(self.last_id + 1);
        self.last_id
    }

    /// Returns the active session for the group, creating and persisting a
    /// fresh one when none exists. The bool is `true` when a session was
    /// created; the caller then claims exclusive ownership of the group.
    pub async fn get_or_create(
        &mut self,
        group_id: GroupId,
        tab: &TabInfo,
    ) -> Result<(Session, bool)> {
        if let Some(existing) = self.sessions.get(&group_id) {
            return Ok((existing.clone(), false));
        }

        let session = Session {
            id: self.next_id(),
            group_id,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            tab_id: tab.id,
            tab_title: if tab.title.is_empty() {
                "Unknown".to_string()
            } else {
                tab.title.clone()
            },
            tab_url: if tab.url.is_empty() {
                "Unknown".to_string()
            } else {
                tab.url.clone()
            },
            screenshot_count: 0,
            status: SessionStatus::Active,
            visited_urls: Vec::new(),
        };

        info!(
            session_id = session.id,
            group_id,
            tab_id = tab.id,
            "Agent session started"
        );
        self.sessions.insert(group_id, session.clone());
        self.queue.prepend_session(session.clone()).await?;
        Ok((session, true))
    }

    /// End the group's session: mark it ended, compute the rounded duration
    /// in seconds, persist, and evict. No-op when no session exists. The
    /// caller clears matching activations.
    pub async fn end(&mut self, group_id: GroupId, reason: &str) -> Result<Option<Session>> {
        let Some(mut session) = self.sessions.remove(&group_id) else {
            return Ok(None);
        };

        let end_time = Utc::now();
        let elapsed_ms = (end_time - session.start_time).num_milliseconds();
        session.end_time = Some(end_time);
        session.status = SessionStatus::Ended;
        session.duration = Some(((elapsed_ms as f64) / 1000.0).round() as i64);

        info!(
            session_id = session.id,
            group_id,
            reason,
            duration_secs = session.duration,
            "Agent session ended"
        );
        self.queue.update_session(session.clone()).await?;
        Ok(Some(session))
    }

    /// Idempotent append to the session's visited URLs; persists only when
    /// the URL is new. Returns whether it was appended.
    pub async fn add_visited(&mut self, group_id: GroupId, url: &str) -> Result<bool> {
        let Some(session) = self.sessions.get_mut(&group_id) else {
            return Ok(false);
        };
        if session.visited_urls.iter().any(|u| u == url) {
            return Ok(false);
        }
        session.visited_urls.push(url.to_string());
        debug!(session_id = session.id, url, "Visited URL recorded");
        let snapshot = session.clone();
        self.queue.update_session(snapshot).await?;
        Ok(true)
    }

    /// Adopt a persisted session that survived a restart.
    pub fn restore(&mut self, session: Session) {
        self.last_id = self.last_id.max(session.id);
        self.sessions.insert(session.group_id, session);
    }

    /// Follow the persisted screenshot count maintained by the audit queue.
    pub fn set_screenshot_count(&mut self, session_id: SessionId, count: u32) {
        if let Some(session) = self.sessions.values_mut().find(|s| s.id == session_id) {
            session.screenshot_count = count;
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
