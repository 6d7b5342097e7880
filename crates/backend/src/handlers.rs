use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use inbox_types::{
    CalendarEventResponse, ContextSnapshot, CreateMessageRequest, MessageResponse, MessageSource,
    StatusResponse, SummarizeRequest, SummaryResponse, SyncResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::context::fetch_full_context;
use crate::db::{messages, users};
use crate::error::{ApiError, ApiResult};
use crate::google::{CalendarClient, CalendarEvent};
use crate::models::{NewAttachment, NewMessage};
use crate::summarize::{Summarizer, DEFAULT_MAX_SENTENCES};
use crate::sync::run_sync_cycle;
use crate::AppState;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    pub limit: Option<i64>,
}

/// Messages with their attachments, newest first
pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ListMessagesParams>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let mut conn = state.pool.get().await?;
    let items = messages::list_recent(&mut conn, limit).await?;
    let responses = messages::with_attachments(&mut conn, items).await?;

    Ok(Json(responses))
}

/// The same snapshot the poller broadcasts, computed on demand
pub async fn get_context(State(state): State<AppState>) -> ApiResult<Json<ContextSnapshot>> {
    let mut conn = state.pool.get().await?;
    let snapshot = fetch_full_context(&mut conn).await?;
    Ok(Json(snapshot))
}

pub async fn create_message(
    State(state): State<AppState>,
    Json(payload): Json<CreateMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    if payload.attachments.iter().any(|a| a.name.trim().is_empty()) {
        return Err(ApiError::bad_request("attachment name must not be empty"));
    }

    let new_message = NewMessage {
        source: MessageSource::Manual.as_str().to_string(),
        external_id: Uuid::new_v4().to_string(),
        course_id: payload.course_id,
        title: Some(title.to_string()),
        snippet: payload.snippet,
        body: payload.body,
        message_type: payload.message_type,
        due_datetime: payload.due_datetime,
    };

    let mut conn = state.pool.get().await?;
    let new_attachments = payload.attachments;
    let response = state
        .notifier
        .publish_stored(messages::insert_with_attachments(
            &mut conn,
            new_message,
            move |message_id| {
                new_attachments
                    .into_iter()
                    .map(|a| NewAttachment {
                        message_id,
                        name: a.name,
                        mime_type: a.mime_type,
                        drive_file_id: None,
                        url: a.url,
                    })
                    .collect()
            },
        ))
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Manual item id collided")))?;
    tracing::info!(message_id = %response.id, "Created manual item");

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn summarize_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    payload: Option<Json<SummarizeRequest>>,
) -> ApiResult<Json<SummaryResponse>> {
    let openai = state.config.openai()?.clone();
    let max_sentences = payload
        .and_then(|Json(req)| req.max_sentences)
        .unwrap_or(DEFAULT_MAX_SENTENCES);

    let mut conn = state.pool.get().await?;
    let item = messages::get_by_id(&mut conn, message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    drop(conn);

    let text = item
        .body
        .or(item.snippet)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Message has no text to summarize"))?;

    let summary = Summarizer::new(state.http.clone(), openai)
        .summarize(&text, max_sentences)
        .await
        .map_err(|e| ApiError::Upstream(format!("{:#}", e)))?;

    Ok(Json(SummaryResponse {
        message_id,
        summary,
    }))
}

/// Put a message's deadline on the connected user's primary calendar
pub async fn add_to_calendar(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> ApiResult<Json<CalendarEventResponse>> {
    let google = state.config.google()?.clone();

    let mut conn = state.pool.get().await?;
    let item = messages::get_by_id(&mut conn, message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    let event = CalendarEvent::for_deadline(&item)
        .ok_or_else(|| ApiError::bad_request("Message has no due date"))?;

    let user = users::latest_with_refresh_token(&mut conn)
        .await?
        .ok_or_else(|| ApiError::bad_request("No Google account connected"))?;
    drop(conn);

    let refresh_token = user.refresh_token.unwrap_or_default();
    let created = async {
        let client = CalendarClient::from_refresh_token(&google, &refresh_token).await?;
        client.create_event(&event).await
    }
    .await
    .map_err(|e| ApiError::Upstream(format!("{:#}", e)))?;

    Ok(Json(CalendarEventResponse {
        message_id,
        event_id: created.id,
        html_link: created.html_link,
    }))
}

/// Run one Google sync cycle now
pub async fn trigger_sync(State(state): State<AppState>) -> ApiResult<Json<SyncResponse>> {
    state.config.google()?;
    let stats = run_sync_cycle(&state).await?;
    Ok(Json(stats))
}
