//! Pending OAuth `state` values issued by `/auth/start`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long a consent round trip may take
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Default)]
pub struct OAuthStates {
    pending: Arc<Mutex<HashMap<String, Instant>>>,
}

impl OAuthStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh state value and remember it until it is used or expires.
    pub async fn issue(&self) -> String {
        let value = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();

        let mut pending = self.pending.lock().await;
        pending.retain(|_, issued| now.duration_since(*issued) < STATE_TTL);
        pending.insert(value.clone(), now);
        value
    }

    /// Consume `value`. Each issued state is accepted at most once.
    pub async fn take(&self, value: &str) -> bool {
        match self.pending.lock().await.remove(value) {
            Some(issued) => issued.elapsed() < STATE_TTL,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_is_accepted_once() {
        let states = OAuthStates::new();
        let value = states.issue().await;

        assert!(!states.take("forged").await);
        assert!(states.take(&value).await);
        assert!(!states.take(&value).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_state_is_rejected() {
        let states = OAuthStates::new();
        let stale = states.issue().await;

        tokio::time::advance(STATE_TTL + Duration::from_secs(1)).await;
        let fresh = states.issue().await;

        assert!(!states.take(&stale).await);
        assert!(states.take(&fresh).await);
    }
}
