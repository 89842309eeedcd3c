use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use warden_core::{Activation, AuditEntry, Error, Result, Session, SessionId};

use crate::store::{keys, KeyValueStore};

enum WriteRequest {
    Audit {
        entry: AuditEntry,
        activation: Activation,
        done: oneshot::Sender<Option<String>>,
    },
    Session {
        write: SessionWrite,
        done: oneshot::Sender<Result<()>>,
    },
}

enum SessionWrite {
    Prepend(Session),
    Update(Session),
    ReplaceAll(Vec<Session>),
}

/// Owns every write to the `screenshots` and `sessions` collections: audit
/// entries and session-archive mutations all flow through one consumer
/// task, so no two read-modify-write cycles can ever interleave.
#[derive(Clone)]
pub struct AuditWriteQueue {
    tx: mpsc::UnboundedSender<WriteRequest>,
}

impl AuditWriteQueue {
    /// Start the drain task. `counts_tx` receives `(session_id, count)`
    /// after each successful write so in-memory session state can follow
    /// the persisted screenshot count.
    pub fn spawn(
        store: Arc<dyn KeyValueStore>,
        max_entries: usize,
        counts_tx: mpsc::UnboundedSender<(SessionId, u32)>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteRequest>();
        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                drain_one(store.as_ref(), max_entries, &counts_tx, request).await;
            }
            debug!("Audit write queue drained and closed");
        });
        (Self { tx }, handle)
    }

    /// Queue one entry. The receiver resolves with `Some(id)` once the entry
    /// is persisted, `None` if persistence failed (logged, never fatal).
    pub fn enqueue(
        &self,
        entry: AuditEntry,
        activation: Activation,
    ) -> oneshot::Receiver<Option<String>> {
        let (done, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(request)) = self.tx.send(WriteRequest::Audit {
            entry,
            activation,
            done,
        }) {
            warn!("Audit write queue is gone, dropping entry");
            if let WriteRequest::Audit { done, .. } = request {
                let _ = done.send(None);
            }
        }
        rx
    }

    /// Insert a new session at the front of the persisted list.
    pub async fn prepend_session(&self, session: Session) -> Result<()> {
        self.session_write(SessionWrite::Prepend(session)).await
    }

    /// Replace the persisted record matching `session.id`. The persisted
    /// `screenshotCount` is kept; only the drain step moves that field.
    pub async fn update_session(&self, session: Session) -> Result<()> {
        self.session_write(SessionWrite::Update(session)).await
    }

    /// Overwrite the whole persisted list (startup reconciliation).
    pub async fn replace_sessions(&self, sessions: Vec<Session>) -> Result<()> {
        self.session_write(SessionWrite::ReplaceAll(sessions)).await
    }

    async fn session_write(&self, write: SessionWrite) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Session { write, done })
            .map_err(|_| Error::Channel("audit write queue is gone".to_string()))?;
        rx.await
            .map_err(|_| Error::Channel("audit write queue dropped the request".to_string()))?
    }
}

async fn drain_one(
    store: &dyn KeyValueStore,
    max_entries: usize,
    counts_tx: &mpsc::UnboundedSender<(SessionId, u32)>,
    request: WriteRequest,
) {
    match request {
        WriteRequest::Audit {
            entry,
            activation,
            done,
        } => {
            let entry_id = entry.id.clone();
            let outcome = persist(store, max_entries, entry, activation, counts_tx).await;
            let resolved = match outcome {
                Ok(()) => Some(entry_id),
                Err(e) => {
                    error!(error = %e, "Audit storage write failed");
                    None
                }
            };
            let _ = done.send(resolved);
        }
        WriteRequest::Session { write, done } => {
            let _ = done.send(apply_session_write(store, write).await);
        }
    }
}

async fn apply_session_write(store: &dyn KeyValueStore, write: SessionWrite) -> Result<()> {
    let sessions = match write {
        SessionWrite::Prepend(session) => {
            let current = store.get(&[keys::SESSIONS]).await?;
            let mut sessions = parse_sessions(current.get(keys::SESSIONS));
            sessions.insert(0, session);
            sessions
        }
        SessionWrite::Update(session) => {
            let current = store.get(&[keys::SESSIONS]).await?;
            let mut sessions = parse_sessions(current.get(keys::SESSIONS));
            match sessions.iter_mut().find(|s| s.id == session.id) {
                Some(slot) => {
                    let persisted_count = slot.screenshot_count;
                    *slot = session;
                    slot.screenshot_count = persisted_count;
                }
                None => {
                    debug!(
                        session_id = session.id,
                        "Session not in archive, skipping update"
                    );
                    return Ok(());
                }
            }
            sessions
        }
        SessionWrite::ReplaceAll(sessions) => sessions,
    };

    let mut entries = HashMap::new();
    entries.insert(keys::SESSIONS.to_string(), serde_json::to_value(sessions)?);
    store.set(entries).await
}

async fn persist(
    store: &dyn KeyValueStore,
    max_entries: usize,
    entry: AuditEntry,
    activation: Activation,
    counts_tx: &mpsc::UnboundedSender<(SessionId, u32)>,
) -> Result<()> {
    let current = store.get(&[keys::SCREENSHOTS, keys::SESSIONS]).await?;

    let mut screenshots = parse_entries(current.get(keys::SCREENSHOTS));
    let mut sessions = parse_sessions(current.get(keys::SESSIONS));

    screenshots.push(entry);
    while screenshots.len() > max_entries {
        screenshots.remove(0);
    }

    let mut new_count = None;
    if let Some(session) = sessions.iter_mut().find(|s| s.id == activation.session_id) {
        session.screenshot_count += 1;
        new_count = Some(session.screenshot_count);
    }

    match write_both(store, &screenshots, &sessions).await {
        Ok(()) => {}
        Err(Error::QuotaExceeded(detail)) => {
            // One corrective trim: halve the retained window and retry.
            warn!(%detail, "Store quota exceeded, trimming retained audit entries");
            let keep = (max_entries / 2).max(1);
            while screenshots.len() > keep {
                screenshots.remove(0);
            }
            write_both(store, &screenshots, &sessions).await?;
        }
        Err(e) => return Err(e),
    }

    if let Some(count) = new_count {
        let _ = counts_tx.send((activation.session_id, count));
    }
    Ok(())
}

async fn write_both(
    store: &dyn KeyValueStore,
    screenshots: &[AuditEntry],
    sessions: &[Session],
) -> Result<()> {
    let mut entries = HashMap::new();
    entries.insert(
        keys::SCREENSHOTS.to_string(),
        serde_json::to_value(screenshots)?,
    );
    entries.insert(keys::SESSIONS.to_string(), serde_json::to_value(sessions)?);
    store.set(entries).await
}

fn parse_entries(value: Option<&serde_json::Value>) -> Vec<AuditEntry> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping malformed audit entry");
                None
            }
        })
        .collect()
}

fn parse_sessions(value: Option<&serde_json::Value>) -> Vec<Session> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(error = %e, "Skipping malformed session record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionArchive;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Semaphore;
    use warden_core::{AuditReason, EventDetails, SessionStatus};

    fn entry(id: &str, session_id: SessionId) -> AuditEntry {
        AuditEntry {
            id: id.to_string(),
            session_id,
            tab_id: 1,
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            reason: AuditReason::AgentEvent,
            timestamp: Utc::now(),
            data_url: None,
            event_type: "click".to_string(),
            event_details: EventDetails {
                action_type: "click".to_string(),
                ..Default::default()
            },
        }
    }

    fn session(id: SessionId) -> Session {
        Session {
            id,
            group_id: 1,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            tab_id: 1,
            tab_title: "t".to_string(),
            tab_url: "u".to_string(),
            screenshot_count: 0,
            status: SessionStatus::Active,
            visited_urls: vec![],
        }
    }

    const ACTIVATION: Activation = Activation {
        session_id: 7,
        group_id: 1,
    };

    fn spawn_over(store: Arc<dyn KeyValueStore>) -> AuditWriteQueue {
        let (counts_tx, _counts_rx) = mpsc::unbounded_channel();
        let (queue, worker) = AuditWriteQueue::spawn(store, 100, counts_tx);
        // Detached worker; it exits when the queue handle drops.
        drop(worker);
        queue
    }

    #[tokio::test]
    async fn entries_land_in_enqueue_order_with_cap() {
        let store = Arc::new(MemoryStore::new());
        let (counts_tx, mut counts_rx) = mpsc::unbounded_channel();
        let (queue, _worker) = AuditWriteQueue::spawn(store.clone(), 100, counts_tx);
        queue.replace_sessions(vec![session(7)]).await.unwrap();

        let receipts: Vec<_> = (0..150)
            .map(|i| queue.enqueue(entry(&format!("e{i}"), 7), ACTIVATION))
            .collect();
        for receipt in receipts {
            assert!(receipt.await.unwrap().is_some());
        }

        let stored = store.get(&[keys::SCREENSHOTS, keys::SESSIONS]).await.unwrap();
        let screenshots = parse_entries(stored.get(keys::SCREENSHOTS));
        assert_eq!(screenshots.len(), 100);
        assert_eq!(screenshots.first().unwrap().id, "e50");
        assert_eq!(screenshots.last().unwrap().id, "e149");

        let sessions = parse_sessions(stored.get(keys::SESSIONS));
        assert_eq!(sessions[0].screenshot_count, 150);

        let mut last_count = 0;
        while let Ok((id, count)) = counts_rx.try_recv() {
            assert_eq!(id, 7);
            last_count = count;
        }
        assert_eq!(last_count, 150);
    }

    #[tokio::test]
    async fn prepend_puts_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let queue = spawn_over(store.clone());
        queue.prepend_session(session(1)).await.unwrap();
        queue.prepend_session(session(2)).await.unwrap();

        let all = SessionArchive::new(store).load_all().await.unwrap();
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn update_replaces_matching_record_only() {
        let store = Arc::new(MemoryStore::new());
        let queue = spawn_over(store.clone());
        queue.prepend_session(session(1)).await.unwrap();
        queue.prepend_session(session(2)).await.unwrap();

        let mut changed = session(1);
        changed.status = SessionStatus::Ended;
        changed.duration = Some(5);
        queue.update_session(changed).await.unwrap();

        let all = SessionArchive::new(store).load_all().await.unwrap();
        let one = all.iter().find(|s| s.id == 1).unwrap();
        assert_eq!(one.status, SessionStatus::Ended);
        assert_eq!(one.duration, Some(5));
        assert_eq!(all.iter().find(|s| s.id == 2).unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn update_of_missing_session_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let queue = spawn_over(store.clone());
        queue.update_session(session(9)).await.unwrap();
        assert!(SessionArchive::new(store).load_all().await.unwrap().is_empty());
    }

    /// Stalls the first `set` until the gate opens, then delegates.
    struct GatedStore {
        inner: MemoryStore,
        gate: Semaphore,
        stall_next: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for GatedStore {
        async fn get(&self, keys: &[&str]) -> Result<HashMap<String, serde_json::Value>> {
            self.inner.get(keys).await
        }

        async fn set(&self, entries: HashMap<String, serde_json::Value>) -> Result<()> {
            if self.stall_next.swap(false, Ordering::SeqCst) {
                let permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|e| Error::Storage(e.to_string()))?;
                permit.forget();
            }
            self.inner.set(entries).await
        }
    }

    #[tokio::test]
    async fn session_end_is_not_clobbered_by_an_in_flight_drain() {
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            gate: Semaphore::new(0),
            stall_next: AtomicBool::new(false),
        });
        let queue = spawn_over(store.clone());
        queue.replace_sessions(vec![session(7)]).await.unwrap();

        // Stall the worker mid-drain, then end the session behind it.
        store.stall_next.store(true, Ordering::SeqCst);
        let receipt = queue.enqueue(entry("e0", 7), ACTIVATION);

        let mut ended = session(7);
        ended.status = SessionStatus::Ended;
        ended.end_time = Some(Utc::now());
        ended.duration = Some(3);
        let end_queue = queue.clone();
        let end_write = tokio::spawn(async move { end_queue.update_session(ended).await });
        tokio::task::yield_now().await;

        store.gate.add_permits(1);
        assert!(receipt.await.unwrap().is_some());
        end_write.await.unwrap().unwrap();

        let after = SessionArchive::new(store).find(7).await.unwrap().unwrap();
        assert_eq!(after.status, SessionStatus::Ended);
        assert_eq!(after.duration, Some(3));
        // The drain's increment survives the end write.
        assert_eq!(after.screenshot_count, 1);
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _keys: &[&str]) -> Result<HashMap<String, serde_json::Value>> {
            Ok(HashMap::new())
        }

        async fn set(&self, _entries: HashMap<String, serde_json::Value>) -> Result<()> {
            Err(Error::Storage("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_write_resolves_none_and_keeps_draining() {
        let (counts_tx, _counts_rx) = mpsc::unbounded_channel();
        let (queue, _worker) = AuditWriteQueue::spawn(Arc::new(FailingStore), 100, counts_tx);

        let first = queue.enqueue(entry("a", 7), ACTIVATION);
        let second = queue.enqueue(entry("b", 7), ACTIVATION);
        assert!(first.await.unwrap().is_none());
        assert!(second.await.unwrap().is_none());
    }

    /// Fails with a quota error on the first `set`, then delegates.
    struct QuotaOnceStore {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl KeyValueStore for QuotaOnceStore {
        async fn get(&self, keys: &[&str]) -> Result<HashMap<String, serde_json::Value>> {
            self.inner.get(keys).await
        }

        async fn set(&self, entries: HashMap<String, serde_json::Value>) -> Result<()> {
            if self.failures.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::QuotaExceeded("synthetic".to_string()));
            }
            self.inner.set(entries).await
        }
    }

    #[tokio::test]
    async fn quota_error_triggers_corrective_trim() {
        let store = Arc::new(QuotaOnceStore {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(0),
        });
        let (counts_tx, _counts_rx) = mpsc::unbounded_channel();
        let (queue, _worker) = AuditWriteQueue::spawn(store.clone(), 100, counts_tx);

        let receipt = queue.enqueue(entry("kept", 7), ACTIVATION);
        assert_eq!(receipt.await.unwrap(), Some("kept".to_string()));

        let stored = store.get(&[keys::SCREENSHOTS]).await.unwrap();
        let screenshots = parse_entries(stored.get(keys::SCREENSHOTS));
        assert_eq!(screenshots.len(), 1);
        assert_eq!(screenshots[0].id, "kept");
    }
}
