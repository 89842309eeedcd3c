use std::collections::HashMap;
use tracing::debug;
use warden_core::{Activation, GroupId, Session, TabId};

/// Which tabs the agent is actively operating on right now. Entries exist
/// only between an agent-start signal (or lazy adoption) and the matching
/// stop, tab close, or session end.
#[derive(Default)]
pub struct ActivationTracker {
    active: HashMap<TabId, Activation>,
}

impl ActivationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a tab under an existing session. Callers must hold a
    /// live session; there is no activation without one.
    pub fn start(&mut self, tab_id: TabId, session: &Session) {
        self.active.insert(
            tab_id,
            Activation {
                session_id: session.id,
                group_id: session.group_id,
            },
        );
    }

    pub fn stop(&mut self, tab_id: TabId) -> Option<Activation> {
        self.active.remove(&tab_id)
    }

    pub fn get(&self, tab_id: TabId) -> Option<Activation> {
        self.active.get(&tab_id).copied()
    }

    /// Drop every activation belonging to a group; used when its session
    /// ends.
    pub fn clear_group(&mut self, group_id: GroupId) {
        let before = self.active.len();
        self.active.retain(|_, a| a.group_id != group_id);
        let removed = before - self.active.len();
        if removed > 0 {
            debug!(group_id, removed, "Cleared activations for ended session");
        }
    }

    /// Any tab currently active inside the group.
    pub fn any_in_group(&self, group_id: GroupId) -> Option<TabId> {
        self.active
            .iter()
            .find(|(_, a)| a.group_id == group_id)
            .map(|(tab_id, _)| *tab_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
