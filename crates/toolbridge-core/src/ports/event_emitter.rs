//! Outbound event sink shared by every service.

use tokio::sync::broadcast;

use crate::events::AppEvent;

/// Where services publish [`AppEvent`]s.
///
/// `emit` is called from inside connection and install tasks, so it must
/// return immediately; slow consumers belong behind a channel.
pub trait AppEventEmitter: Send + Sync {
    fn emit(&self, event: AppEvent);

    fn clone_box(&self) -> Box<dyn AppEventEmitter>;
}

/// Drops everything.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl AppEventEmitter for NoopEmitter {
    fn emit(&self, _event: AppEvent) {}

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

/// Broadcasts events to any number of subscribers.
///
/// Events sent while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    sender: broadcast::Sender<AppEvent>,
}

impl ChannelEmitter {
    /// Lagging subscribers lose the oldest events beyond `capacity`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AppEventEmitter for ChannelEmitter {
    fn emit(&self, event: AppEvent) {
        let _ = self.sender.send(event);
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingEmitter;

impl AppEventEmitter for TracingEmitter {
    fn emit(&self, event: AppEvent) {
        match &event {
            AppEvent::Install {
                event: crate::events::InstallEvent::Progress { package, line },
            } => {
                tracing::debug!(package = %package, "{line}");
            }
            AppEvent::McpServerError { error } => {
                tracing::warn!(
                    server_name = %error.server_name,
                    category = ?error.category,
                    "{}",
                    error.message
                );
            }
            other => {
                let payload = serde_json::to_string(other).unwrap_or_default();
                tracing::info!(event = other.event_name(), "{payload}");
            }
        }
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConnectionState;
    use std::sync::Arc;

    #[test]
    fn test_noop_emitter() {
        let emitter: Arc<dyn AppEventEmitter> = Arc::new(NoopEmitter::new());
        emitter.emit(AppEvent::status_changed("a", ConnectionState::Stopped));
        let _boxed = emitter.clone_box();
    }

    #[tokio::test]
    async fn test_channel_emitter_delivers_to_subscribers() {
        let emitter = ChannelEmitter::new(8);
        let mut rx = emitter.subscribe();

        emitter.emit(AppEvent::status_changed("a", ConnectionState::Connected));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            AppEvent::status_changed("a", ConnectionState::Connected)
        );
    }

    #[test]
    fn test_channel_emitter_without_subscribers() {
        let emitter = ChannelEmitter::default();
        emitter.emit(AppEvent::status_changed("a", ConnectionState::Stopped));
    }
}
