//! Google sync background task.
//!
//! Periodically pulls Classroom coursework and Gmail messages for every user
//! with a stored refresh token, stores new items and pushes them to clients
//! as `item:new`.

use anyhow::{Context, Result};
use diesel_async::AsyncPgConnection;
use inbox_types::{MessageSource, SyncResponse};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::GoogleConfig;
use crate::db::{self, courses, messages, users};
use crate::google::classroom_client::CourseWork;
use crate::google::gmail_client::EmailMessage;
use crate::google::{oauth, ClassroomClient, GmailClient};
use crate::models::{NewAttachment, NewMessage, UserRow};
use crate::realtime::Notifier;
use crate::AppState;

/// Longest snippet derived from a coursework description
const SNIPPET_CHARS: usize = 200;

/// Run sync cycles until `cancel` fires. The first cycle runs immediately.
pub async fn start_sync_task(state: AppState, interval: Duration, cancel: CancellationToken) {
    tracing::info!("Starting Google sync task (interval: {:?})", interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = run_sync_cycle(&state) => match result {
                Ok(stats) => {
                    tracing::info!(
                        "Sync cycle complete: {} users, {} new items",
                        stats.users,
                        stats.new_items
                    );
                }
                Err(e) => {
                    tracing::error!("Sync cycle failed: {:?}", e);
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Google sync task stopped");
}

/// Sync every connected user once. Per-user failures are logged and skipped.
pub async fn run_sync_cycle(state: &AppState) -> Result<SyncResponse> {
    let google = state
        .config
        .google
        .clone()
        .context("Google OAuth is not configured")?;
    let mut conn = db::get_conn(&state.pool).await?;

    let accounts = users::list_with_refresh_token(&mut conn).await?;
    if accounts.is_empty() {
        tracing::debug!("No connected Google accounts to sync");
    }

    let mut new_items = 0;
    for user in &accounts {
        match sync_user(&mut conn, state, &google, user).await {
            Ok(count) => new_items += count,
            Err(e) => {
                tracing::error!("Failed to sync {}: {:?}", user.email, e);
            }
        }
    }

    Ok(SyncResponse {
        users: accounts.len(),
        new_items,
    })
}

async fn sync_user(
    conn: &mut AsyncPgConnection,
    state: &AppState,
    google: &GoogleConfig,
    user: &UserRow,
) -> Result<usize> {
    let access_token = oauth::access_token_for(conn, &state.http, google, user).await?;
    let mut new_items = 0;

    let classroom = ClassroomClient::new(state.http.clone(), access_token);
    match sync_classroom(conn, &state.notifier, &classroom).await {
        Ok(count) => new_items += count,
        Err(e) => tracing::warn!("Classroom sync failed for {}: {:?}", user.email, e),
    }

    if let Some(refresh_token) = user.refresh_token.as_deref() {
        let result = async {
            let gmail = GmailClient::from_refresh_token(google, refresh_token).await?;
            let emails = gmail.fetch_messages(state.config.sync_max_messages).await?;
            sync_emails(conn, &state.notifier, emails).await
        }
        .await;

        match result {
            Ok(count) => new_items += count,
            Err(e) => tracing::warn!("Gmail sync failed for {}: {:?}", user.email, e),
        }
    }

    tracing::debug!("Synced {} new items for {}", new_items, user.email);
    Ok(new_items)
}

async fn sync_classroom(
    conn: &mut AsyncPgConnection,
    notifier: &Notifier,
    classroom: &ClassroomClient,
) -> Result<usize> {
    let mut new_items = 0;

    for remote in classroom.list_courses().await? {
        if remote.course_state.as_deref() == Some("ARCHIVED") {
            continue;
        }

        let course = courses::upsert(conn, &remote.id, &remote.name).await?;

        let work = match classroom.list_course_work(&remote.id).await {
            Ok(work) => work,
            Err(e) => {
                tracing::warn!("Skipping course {}: {:?}", remote.name, e);
                continue;
            }
        };

        for item in &work {
            let saved = save_item(
                conn,
                notifier,
                coursework_to_new_message(item, course.id),
                |message_id| coursework_attachments(item, message_id),
            )
            .await?;
            if saved {
                new_items += 1;
            }
        }
    }

    Ok(new_items)
}

async fn sync_emails(
    conn: &mut AsyncPgConnection,
    notifier: &Notifier,
    emails: Vec<EmailMessage>,
) -> Result<usize> {
    let mut new_items = 0;

    for email in &emails {
        let saved = save_item(conn, notifier, email_to_new_message(email), |message_id| {
            email_attachments(email, message_id)
        })
        .await?;
        if saved {
            tracing::debug!(
                from = %email.from,
                received_at = ?email.received_at,
                "Stored email {}",
                email.id
            );
            new_items += 1;
        }
    }

    Ok(new_items)
}

/// Store one item with its attachments and announce it once committed.
/// Returns `false` for items already stored.
async fn save_item<F>(
    conn: &mut AsyncPgConnection,
    notifier: &Notifier,
    new_message: NewMessage,
    make_attachments: F,
) -> Result<bool>
where
    F: FnOnce(Uuid) -> Vec<NewAttachment> + Send,
{
    let stored = notifier
        .publish_stored(messages::insert_with_attachments(
            conn,
            new_message,
            make_attachments,
        ))
        .await?;

    Ok(stored.is_some())
}

pub fn coursework_to_new_message(work: &CourseWork, course_id: Uuid) -> NewMessage {
    let description = work
        .description
        .clone()
        .filter(|d| !d.trim().is_empty());

    NewMessage {
        source: MessageSource::Classroom.as_str().to_string(),
        external_id: work.id.clone(),
        course_id: Some(course_id),
        title: Some(work.title.clone()),
        snippet: description
            .as_deref()
            .map(|d| d.chars().take(SNIPPET_CHARS).collect()),
        body: description,
        message_type: work.work_type.clone(),
        due_datetime: work.due_datetime(),
    }
}

pub fn coursework_attachments(work: &CourseWork, message_id: Uuid) -> Vec<NewAttachment> {
    work.materials
        .iter()
        .filter_map(|material| {
            if let Some(shared) = &material.drive_file {
                let file = &shared.drive_file;
                return Some(NewAttachment {
                    message_id,
                    name: file.title.clone().unwrap_or_else(|| file.id.clone()),
                    mime_type: None,
                    drive_file_id: Some(file.id.clone()),
                    url: file.alternate_link.clone(),
                });
            }

            material.link.as_ref().map(|link| NewAttachment {
                message_id,
                name: link.title.clone().unwrap_or_else(|| link.url.clone()),
                mime_type: None,
                drive_file_id: None,
                url: Some(link.url.clone()),
            })
        })
        .collect()
}

pub fn email_to_new_message(email: &EmailMessage) -> NewMessage {
    NewMessage {
        source: MessageSource::Gmail.as_str().to_string(),
        external_id: email.id.clone(),
        course_id: None,
        title: Some(email.subject.clone()).filter(|s| !s.is_empty()),
        snippet: Some(email.snippet.clone()).filter(|s| !s.is_empty()),
        body: email.body_text.clone(),
        message_type: Some("email".to_string()),
        due_datetime: None,
    }
}

pub fn email_attachments(email: &EmailMessage, message_id: Uuid) -> Vec<NewAttachment> {
    email
        .attachments
        .iter()
        .map(|file| NewAttachment {
            message_id,
            name: file.filename.clone(),
            mime_type: file.mime_type.clone(),
            drive_file_id: None,
            url: None,
        })
        .collect()
}
