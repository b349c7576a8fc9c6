//! View-invalidation signaling.
//!
//! The orchestrator announces which views are stale after a write so any
//! subscriber (the chat page poller, a future SSE bridge) re-reads fresh
//! data. Delivery is best-effort; with no subscribers the signal is
//! simply dropped.

use tokio::sync::broadcast;
use tracing::debug;

/// Views that render conversation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Chat,
    Logs,
}

impl View {
    pub fn as_path(&self) -> &'static str {
        match self {
            View::Chat => "/chat",
            View::Logs => "/logs",
        }
    }
}

#[derive(Clone)]
pub struct ViewInvalidator {
    tx: broadcast::Sender<View>,
}

impl ViewInvalidator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        ViewInvalidator { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<View> {
        self.tx.subscribe()
    }

    pub fn invalidate(&self, view: View) {
        debug!("Invalidating view {}", view.as_path());
        let _ = self.tx.send(view);
    }
}

impl Default for ViewInvalidator {
    fn default() -> Self {
        Self::new()
    }
}
