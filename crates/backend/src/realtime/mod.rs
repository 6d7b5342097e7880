//! Realtime push to browser clients.
//!
//! Clients connect to `/ws/mcp` and receive `context:update` snapshots from
//! the background poller, `item:new` events when items are created, and
//! `pong` replies to their own pings.

use anyhow::{Context, Result};
use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use inbox_types::{BroadcastMessage, StatusResponse};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::context::ContextSource;
use crate::error::ApiResult;

pub mod gateway;
pub mod poller;
pub mod registry;

pub use poller::ContextPoller;
pub use registry::ConnectionRegistry;

/// Fetch-and-broadcast entry point shared by the poller, the manual refresh
/// endpoint and anything that creates items.
#[derive(Clone)]
pub struct Notifier {
    registry: ConnectionRegistry,
    source: Arc<dyn ContextSource>,
}

impl Notifier {
    pub fn new(registry: ConnectionRegistry, source: Arc<dyn ContextSource>) -> Self {
        Self { registry, source }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Fetch a fresh snapshot and broadcast it as `context:update`.
    ///
    /// Returns the number of connections the update was handed to.
    pub async fn refresh(&self) -> Result<usize> {
        let snapshot = self
            .source
            .fetch_context()
            .await
            .context("Failed to fetch context")?;

        Ok(self
            .registry
            .broadcast(&BroadcastMessage::ContextUpdate(snapshot))
            .await)
    }

    /// Push a newly created item to every client as `item:new`.
    pub async fn item_created<T: Serialize>(&self, item: &T) -> usize {
        match serde_json::to_value(item) {
            Ok(payload) => {
                self.registry
                    .broadcast(&BroadcastMessage::ItemNew(payload))
                    .await
            }
            Err(e) => {
                tracing::error!("Failed to serialize new item: {}", e);
                0
            }
        }
    }

    /// Run `store` to completion and announce the item it returns, if any.
    ///
    /// Nothing is sent when `store` fails or reports an existing item.
    pub async fn publish_stored<T, F>(&self, store: F) -> Result<Option<T>>
    where
        T: Serialize,
        F: Future<Output = Result<Option<T>>>,
    {
        let Some(item) = store.await? else {
            return Ok(None);
        };
        let delivered = self.item_created(&item).await;
        tracing::debug!(delivered, "Announced stored item");
        Ok(Some(item))
    }
}

/// Routes for the WebSocket endpoint and the manual refresh trigger.
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Notifier: FromRef<S>,
{
    Router::new()
        .route("/ws/mcp", get(gateway::ws_handler))
        .route("/api/mcp/refresh", post(manual_refresh))
}

/// Force one fetch-and-broadcast cycle. Fetch errors are returned to the caller.
pub async fn manual_refresh(State(notifier): State<Notifier>) -> ApiResult<Json<StatusResponse>> {
    let delivered = notifier.refresh().await?;
    tracing::info!(delivered, "Manual context refresh broadcast");
    Ok(Json(StatusResponse::ok()))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use inbox_types::{ContextSnapshot, Course};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source returning a fixed snapshot, or failing every call.
    pub struct StaticSource {
        pub snapshot: Option<ContextSnapshot>,
        pub calls: AtomicUsize,
    }

    impl StaticSource {
        pub fn ok() -> Arc<Self> {
            let snapshot = ContextSnapshot {
                generated_at: Some(chrono::Utc::now()),
                courses: vec![Course {
                    id: uuid::Uuid::new_v4(),
                    course_id: "123456".to_string(),
                    name: "Linear Algebra".to_string(),
                    created_at: chrono::Utc::now(),
                }],
                ..Default::default()
            };
            Arc::new(Self {
                snapshot: Some(snapshot),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                snapshot: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContextSource for StaticSource {
        async fn fetch_context(&self) -> Result<ContextSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.snapshot
                .clone()
                .ok_or_else(|| anyhow::anyhow!("database unavailable"))
        }
    }
}
