use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{HubError, Message, NotificationHub, SubscriptionId};

/// Destination a listener writes its message to (a websocket in production)
#[async_trait]
pub trait MessageSink: Send {
    async fn deliver(&mut self, message: &Message) -> Result<(), String>;
}

/// One live listener registered with a [`NotificationHub`]
///
/// Dropping the subscription unregisters it, so every exit path of a
/// listener releases its registry slot.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Message>,
    disconnect: CancellationToken,
    hub: Arc<NotificationHub>,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriptionId,
        rx: mpsc::Receiver<Message>,
        disconnect: CancellationToken,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            id,
            rx,
            disconnect,
            hub,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Token cancelled when the hub forcibly disconnects this subscription
    pub fn disconnected(&self) -> &CancellationToken {
        &self.disconnect
    }

    /// Wait for the next message
    ///
    /// Resolves with [`HubError::Cancelled`] once `cancel` fires, or
    /// [`HubError::SlowConsumer`] if the hub dropped this subscription.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Result<Message, HubError> {
        tokio::select! {
            biased;

            message = self.rx.recv() => match message {
                Some(message) => Ok(message),
                None if self.disconnect.is_cancelled() => Err(HubError::SlowConsumer),
                None => Err(HubError::Closed),
            },
            _ = self.disconnect.cancelled() => Err(HubError::SlowConsumer),
            _ = cancel.cancelled() => Err(HubError::Cancelled),
        }
    }

    /// Wait for exactly one message and write it to `sink`
    ///
    /// The write is bounded by `write_timeout`. The subscription is consumed
    /// and unregistered whichever way this returns.
    pub async fn await_one<S>(
        mut self,
        sink: &mut S,
        cancel: &CancellationToken,
        write_timeout: Duration,
    ) -> Result<Message, HubError>
    where
        S: MessageSink + ?Sized,
    {
        let message = self.recv(cancel).await?;

        match tokio::time::timeout(write_timeout, sink.deliver(&message)).await {
            Ok(Ok(())) => {
                debug!(subscription_id = %self.id, "Message delivered to listener");
                Ok(message)
            }
            Ok(Err(e)) => Err(HubError::Sink(e)),
            Err(_) => Err(HubError::WriteTimeout(write_timeout)),
        }
    }

    /// Unregister now rather than on drop
    pub fn unsubscribe(&self) {
        self.hub.unsubscribe(&self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("disconnected", &self.disconnect.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        written: Vec<Message>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn deliver(&mut self, message: &Message) -> Result<(), String> {
            self.written.push(message.clone());
            Ok(())
        }
    }

    struct StalledSink;

    #[async_trait]
    impl MessageSink for StalledSink {
        async fn deliver(&mut self, _message: &Message) -> Result<(), String> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl MessageSink for BrokenSink {
        async fn deliver(&mut self, _message: &Message) -> Result<(), String> {
            Err("connection reset".to_string())
        }
    }

    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_await_one_writes_and_unregisters() {
        let hub = Arc::new(NotificationHub::new(4));
        let cancel = CancellationToken::new();
        let subscription = hub.subscribe();
        let mut sink = RecordingSink::default();

        let message = Message::complete("/api/v1/download/a_1.png");
        hub.publish(&message);

        let received = subscription
            .await_one(&mut sink, &cancel, WRITE_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(received, message);
        assert_eq!(sink.written, vec![message]);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_await_one_waits_for_publish() {
        let hub = Arc::new(NotificationHub::new(4));
        let cancel = CancellationToken::new();
        let subscription = hub.subscribe();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                hub.publish(&Message::failed())
            })
        };

        let mut sink = RecordingSink::default();
        let received = subscription
            .await_one(&mut sink, &cancel, WRITE_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(received, Message::failed());
        assert_eq!(publisher.await.unwrap().delivered, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_publish() {
        let hub = Arc::new(NotificationHub::new(4));
        let cancel = CancellationToken::new();
        let subscription = hub.subscribe();
        let mut sink = RecordingSink::default();

        cancel.cancel();
        let result = subscription.await_one(&mut sink, &cancel, WRITE_TIMEOUT).await;

        assert!(matches!(result, Err(HubError::Cancelled)));
        assert!(sink.written.is_empty());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_forced_disconnect_ends_wait() {
        let hub = Arc::new(NotificationHub::new(4));
        let cancel = CancellationToken::new();
        let subscription = hub.subscribe();

        subscription.disconnected().cancel();
        let result = subscription
            .await_one(&mut RecordingSink::default(), &cancel, WRITE_TIMEOUT)
            .await;

        assert!(matches!(result, Err(HubError::SlowConsumer)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_timeout() {
        let hub = Arc::new(NotificationHub::new(4));
        let cancel = CancellationToken::new();
        let subscription = hub.subscribe();
        hub.publish(&Message::failed());

        let result = subscription
            .await_one(&mut StalledSink, &cancel, WRITE_TIMEOUT)
            .await;

        assert!(matches!(result, Err(HubError::WriteTimeout(_))));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_sink_error() {
        let hub = Arc::new(NotificationHub::new(4));
        let cancel = CancellationToken::new();
        let subscription = hub.subscribe();
        hub.publish(&Message::failed());

        let result = subscription
            .await_one(&mut BrokenSink, &cancel, WRITE_TIMEOUT)
            .await;

        assert!(matches!(result, Err(HubError::Sink(reason)) if reason == "connection reset"));
    }
}
