//! Pool-wide lifecycle notifications.
//!
//! Events are handed to a dedicated dispatcher task over an unbounded
//! channel, so a slow notifier never stalls the release path or the
//! reconnection loop.

use std::sync::Arc;

use tokio::sync::mpsc;

/// Pool-wide condition reported to a [`Notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
    /// A member was lost and queued for reconnection.
    Disconnect,
    /// The pool went from no connected members to at least one.
    Connected,
    /// No member is connected any more.
    PoolEmpty,
}

impl PoolEvent {
    /// Numeric event code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Disconnect => 0,
            Self::Connected => 1,
            Self::PoolEmpty => 2,
        }
    }
}

impl std::fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::PoolEmpty => "POOL_EMPTY",
        };
        f.write_str(name)
    }
}

/// Receiver of pool lifecycle events.
///
/// Called from a background task; implementations should return quickly
/// and offload anything slow.
pub trait Notifier: Send + Sync {
    /// Handle a single event.
    fn notify(&self, event: PoolEvent);
}

impl<F> Notifier for F
where
    F: Fn(PoolEvent) + Send + Sync,
{
    fn notify(&self, event: PoolEvent) {
        self(event)
    }
}

/// Fire-and-forget front end for an optional notifier.
#[derive(Debug, Clone, Default)]
pub(crate) struct NotificationDispatcher {
    tx: Option<mpsc::UnboundedSender<PoolEvent>>,
}

impl NotificationDispatcher {
    /// Spawn the dispatcher task if a notifier is present.
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// dispatcher clone has been dropped.
    pub(crate) fn spawn(notifier: Option<Arc<dyn Notifier>>) -> Self {
        let Some(notifier) = notifier else {
            return Self::default();
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<PoolEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::trace!(%event, "delivering pool event");
                notifier.notify(event);
            }
        });

        Self { tx: Some(tx) }
    }

    /// Queue an event for delivery. Never blocks.
    pub(crate) fn dispatch(&self, event: PoolEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!(%event, "notifier task gone, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_event_codes() {
        assert_eq!(PoolEvent::Disconnect.code(), 0);
        assert_eq!(PoolEvent::Connected.code(), 1);
        assert_eq!(PoolEvent::PoolEmpty.code(), 2);
        assert_eq!(PoolEvent::PoolEmpty.to_string(), "POOL_EMPTY");
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier: Arc<dyn Notifier> = Arc::new(move |event: PoolEvent| {
            let _ = tx.send(event);
        });

        let dispatcher = NotificationDispatcher::spawn(Some(notifier));
        dispatcher.dispatch(PoolEvent::Connected);
        dispatcher.dispatch(PoolEvent::PoolEmpty);

        assert_eq!(rx.recv().await, Some(PoolEvent::Connected));
        assert_eq!(rx.recv().await, Some(PoolEvent::PoolEmpty));
    }

    #[test]
    fn test_dispatch_without_notifier_is_noop() {
        NotificationDispatcher::default().dispatch(PoolEvent::Disconnect);
    }
}
