use std::sync::Arc;
use tracing::debug;
use warden_core::{Result, Session, SessionId};

use crate::store::{keys, KeyValueStore};

/// Read side of the persisted session list, newest first. Every write to
/// the list goes through the audit write queue, which owns the `sessions`
/// key; readers only ever see whole committed documents.
#[derive(Clone)]
pub struct SessionArchive {
    store: Arc<dyn KeyValueStore>,
}

impl SessionArchive {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load_all(&self) -> Result<Vec<Session>> {
        let result = self.store.get(&[keys::SESSIONS]).await?;
        let Some(value) = result.get(keys::SESSIONS) else {
            return Ok(Vec::new());
        };
        let Some(items) = value.as_array() else {
            debug!("Persisted session list is not an array, ignoring");
            return Ok(Vec::new());
        };

        let mut sessions = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<Session>(item.clone()) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    debug!(error = %e, "Failed to parse persisted session, skipping");
                }
            }
        }
        Ok(sessions)
    }

    pub async fn find(&self, session_id: SessionId) -> Result<Option<Session>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|s| s.id == session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::collections::HashMap;
    use warden_core::SessionStatus;

    fn session(id: SessionId) -> Session {
        Session {
            id,
            group_id: 1,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            tab_id: 10,
            tab_title: "t".to_string(),
            tab_url: "https://example.com".to_string(),
            screenshot_count: 0,
            status: SessionStatus::Active,
            visited_urls: vec![],
        }
    }

    async fn seed(store: &MemoryStore, value: serde_json::Value) {
        let mut entries = HashMap::new();
        entries.insert(keys::SESSIONS.to_string(), value);
        store.set(entries).await.unwrap();
    }

    #[tokio::test]
    async fn find_returns_the_matching_record() {
        let store = Arc::new(MemoryStore::new());
        seed(
            &store,
            serde_json::to_value([session(1), session(2)]).unwrap(),
        )
        .await;

        let archive = SessionArchive::new(store);
        assert_eq!(archive.find(2).await.unwrap().unwrap().id, 2);
        assert!(archive.find(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_store_reads_as_empty_list() {
        let archive = SessionArchive::new(Arc::new(MemoryStore::new()));
        assert!(archive.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        seed(
            &store,
            serde_json::json!([{"bogus": true}, serde_json::to_value(session(3)).unwrap()]),
        )
        .await;

        let archive = SessionArchive::new(store);
        let all = archive.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 3);
    }
}
