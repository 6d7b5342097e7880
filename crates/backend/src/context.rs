//! Aggregated context snapshots.
//!
//! The realtime layer only knows the [`ContextSource`] trait. The production
//! implementation reads the database through one pooled connection per fetch.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel_async::AsyncPgConnection;
use inbox_types::ContextSnapshot;

use crate::db::{self, courses, messages, DbPool};

/// Most recent items included in a snapshot
const RECENT_MESSAGES_LIMIT: i64 = 100;
/// Upcoming deadlines included in a snapshot
const UPCOMING_DEADLINES_LIMIT: i64 = 25;

/// Produces the snapshot broadcast to clients on every refresh.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch_context(&self) -> Result<ContextSnapshot>;
}

/// Database-backed context source.
#[derive(Clone)]
pub struct DbContextSource {
    pool: DbPool,
}

impl DbContextSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContextSource for DbContextSource {
    async fn fetch_context(&self) -> Result<ContextSnapshot> {
        // The connection goes back to the pool when it drops at the end of this call
        let mut conn = db::get_conn(&self.pool).await?;
        fetch_full_context(&mut conn).await
    }
}

/// Load courses, recent items and upcoming deadlines.
pub async fn fetch_full_context(conn: &mut AsyncPgConnection) -> Result<ContextSnapshot> {
    let now = Utc::now();

    let courses = courses::list_all(conn).await?;

    let recent = messages::list_recent(conn, RECENT_MESSAGES_LIMIT).await?;
    let messages = messages::with_attachments(conn, recent).await?;

    let upcoming = messages::list_upcoming(conn, now, UPCOMING_DEADLINES_LIMIT).await?;
    let deadlines = messages::with_attachments(conn, upcoming).await?;

    tracing::debug!(
        courses = courses.len(),
        messages = messages.len(),
        deadlines = deadlines.len(),
        "Fetched context snapshot"
    );

    Ok(ContextSnapshot {
        generated_at: Some(now),
        courses,
        messages,
        deadlines,
    })
}
