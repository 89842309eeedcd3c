use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warden_core::TabId;

/// One buffered input event awaiting a flush.
#[derive(Debug, Clone)]
pub struct PendingInput {
    pub element: Option<serde_json::Value>,
    pub input_value: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Buffer and timer live and die together; aborting the timer and dropping
/// the buffer is one operation.
struct DebounceState {
    inputs: Vec<PendingInput>,
    timer: JoinHandle<()>,
}

/// Coalesces rapid input events per tab: every event reschedules a quiet-
/// period timer, and when the timer finally fires a tick for that tab is
/// sent on `flush_tx` so the engine commits the whole buffer as one audit
/// entry.
pub struct InputDebouncer {
    window: Duration,
    flush_tx: mpsc::UnboundedSender<TabId>,
    pending: HashMap<TabId, DebounceState>,
}

impl InputDebouncer {
    pub fn new(window: Duration, flush_tx: mpsc::UnboundedSender<TabId>) -> Self {
        Self {
            window,
            flush_tx,
            pending: HashMap::new(),
        }
    }

    pub fn push(&mut self, tab_id: TabId, input: PendingInput) {
        let timer = self.schedule(tab_id);
        match self.pending.get_mut(&tab_id) {
            Some(state) => {
                state.timer.abort();
                state.timer = timer;
                state.inputs.push(input);
            }
            None => {
                self.pending.insert(
                    tab_id,
                    DebounceState {
                        inputs: vec![input],
                        timer,
                    },
                );
            }
        }
    }

    fn schedule(&self, tab_id: TabId) -> JoinHandle<()> {
        let window = self.window;
        let tx = self.flush_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(tab_id);
        })
    }

    /// Remove and return the buffered inputs, cancelling any live timer.
    pub fn take(&mut self, tab_id: TabId) -> Option<Vec<PendingInput>> {
        self.pending.remove(&tab_id).map(|state| {
            state.timer.abort();
            state.inputs
        })
    }

    /// Drop a tab's buffer without flushing (tab closed, session ended).
    pub fn cancel(&mut self, tab_id: TabId) {
        if let Some(state) = self.pending.remove(&tab_id) {
            state.timer.abort();
        }
    }

    pub fn has_pending(&self, tab_id: TabId) -> bool {
        self.pending.contains_key(&tab_id)
    }
}

impl Drop for InputDebouncer {
    fn drop(&mut self) {
        for state in self.pending.values() {
            state.timer.abort();
        }
    }
}
