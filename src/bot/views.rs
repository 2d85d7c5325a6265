use std::collections::HashMap;

use tokio::sync::Mutex;

/// List screens that are refreshed in place after related actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    PendingUsers,
    Tipsters,
    Credits,
    OpenTips,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Last message shown per `(owner telegram id, view)`.
#[derive(Default)]
pub struct SessionViews {
    views: Mutex<HashMap<(i64, ViewKind), MessageHandle>>,
}

impl SessionViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, owner: i64, kind: ViewKind, handle: MessageHandle) {
        log::debug!("Tracking {:?} for {} at {:?}", kind, owner, handle);
        self.views.lock().await.insert((owner, kind), handle);
    }

    pub async fn get(&self, owner: i64, kind: ViewKind) -> Option<MessageHandle> {
        self.views.lock().await.get(&(owner, kind)).copied()
    }
}
