//! Active-project tracking.
//!
//! Every async operation captures a [`ContextTicket`] when it starts and
//! checks it with [`ProjectContext::is_current`] before touching shared state.
//! Re-opening the same project issues a new epoch, so results started under
//! the previous opening are treated as stale too.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

/// Identity of one opening of a project view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextTicket {
    pub project_id: Uuid,
    pub epoch: u64,
}

/// Shared handle to the currently active project
#[derive(Debug, Clone)]
pub struct ProjectContext {
    epoch: Arc<AtomicU64>,
    current: Arc<watch::Sender<Option<ContextTicket>>>,
}

impl ProjectContext {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            epoch: Arc::new(AtomicU64::new(0)),
            current: Arc::new(current),
        }
    }

    /// Make `project_id` the active project and return its ticket
    pub fn activate(&self, project_id: Uuid) -> ContextTicket {
        let ticket = ContextTicket {
            project_id,
            epoch: self.epoch.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.current.send_replace(Some(ticket));

        tracing::debug!(project_id = %project_id, epoch = ticket.epoch, "Activated project context");
        ticket
    }

    /// Leave the active project; every outstanding ticket becomes stale
    pub fn clear(&self) {
        if let Some(previous) = self.current.send_replace(None) {
            tracing::debug!(project_id = %previous.project_id, "Cleared project context");
        }
    }

    pub fn current(&self) -> Option<ContextTicket> {
        *self.current.borrow()
    }

    /// The active ticket, if it belongs to `project_id`
    pub fn ticket_for(&self, project_id: Uuid) -> Option<ContextTicket> {
        self.current().filter(|t| t.project_id == project_id)
    }

    pub fn is_current(&self, ticket: &ContextTicket) -> bool {
        self.current().as_ref() == Some(ticket)
    }

    /// Observe project switches
    pub fn subscribe(&self) -> watch::Receiver<Option<ContextTicket>> {
        self.current.subscribe()
    }
}

impl Default for ProjectContext {
    fn default() -> Self {
        Self::new()
    }
}
