use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing toast message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Notice(Notice),
    /// Token refresh failed; the stored session was cleared.
    SessionExpired,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ClientEvent) {
        // No subscribers is fine; nobody is looking at the screen.
        let _ = self.tx.send(event);
    }

    pub fn notify_success(&self, message: impl Into<String>) {
        self.publish(ClientEvent::Notice(Notice {
            level: NoticeLevel::Success,
            message: message.into(),
        }));
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        self.publish(ClientEvent::Notice(Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }));
    }
}
