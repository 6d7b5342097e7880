//! Background loop that re-broadcasts the aggregated context on a fixed interval.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Notifier;

/// Default time between the end of one cycle and the start of the next
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(45);

pub struct ContextPoller {
    notifier: Notifier,
    interval: Duration,
}

impl ContextPoller {
    pub fn new(notifier: Notifier, interval: Duration) -> Self {
        Self { notifier, interval }
    }

    /// Start the loop on its own task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Run fetch-and-broadcast cycles until `cancel` fires.
    ///
    /// The first cycle runs immediately. Failed cycles are logged and retried
    /// on the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "Context polling loop started (interval: {:?})",
            self.interval
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.notifier.refresh() => match result {
                    Ok(delivered) => {
                        tracing::debug!(delivered, "Broadcast context update");
                    }
                    Err(e) => {
                        tracing::error!("Context poll cycle failed: {:?}", e);
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Context polling loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::StaticSource;
    use super::super::registry::{Connection, ConnectionRegistry};
    use super::*;
    use axum::extract::ws::Message;

    #[tokio::test(start_paused = true)]
    async fn test_failing_fetch_keeps_polling() {
        let source = StaticSource::failing();
        let notifier = Notifier::new(ConnectionRegistry::new(), source.clone());
        let cancel = CancellationToken::new();
        let handle = ContextPoller::new(notifier, DEFAULT_POLL_INTERVAL).spawn(cancel.clone());

        // Cycles at t = 0, 45, 90 and 135 seconds
        tokio::time::sleep(Duration::from_secs(136)).await;
        assert_eq!(source.calls(), 4);
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_tick_broadcasts_context_update() {
        let source = StaticSource::ok();
        let notifier = Notifier::new(ConnectionRegistry::new(), source.clone());
        let (connection, mut rx) = Connection::open();
        notifier.registry().register(connection).await;

        let cancel = CancellationToken::new();
        let handle = ContextPoller::new(notifier, Duration::from_secs(10)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut updates = 0;
        while let Ok(frame) = rx.try_recv() {
            match frame {
                Message::Text(text) => {
                    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                    assert_eq!(json["type"], "context:update");
                    updates += 1;
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        // t = 0, 10 and 20
        assert_eq!(updates, 3);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loop_during_wait() {
        let source = StaticSource::ok();
        let notifier = Notifier::new(ConnectionRegistry::new(), source.clone());
        let cancel = CancellationToken::new();
        let handle = ContextPoller::new(notifier, Duration::from_secs(3600)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller should stop promptly")
            .unwrap();
        assert_eq!(source.calls(), 1);
    }
}
