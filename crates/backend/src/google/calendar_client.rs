use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use google_calendar3::api::{Event, EventDateTime};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use inbox_types::MessageItem;

use crate::config::GoogleConfig;

/// Client for writing deadline events to the user's primary calendar
pub struct CalendarClient {
    hub: CalendarHub<HttpsConnector<HttpConnector>>,
}

/// Event to be created in the calendar
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Identifiers of a created event
#[derive(Debug, Clone)]
pub struct CreatedEvent {
    pub id: Option<String>,
    pub html_link: Option<String>,
}

impl CalendarEvent {
    /// One-hour block ending at the item's due time. `None` when the item has no deadline.
    pub fn for_deadline(item: &MessageItem) -> Option<Self> {
        let due = item.due_datetime?;
        let description = item
            .body
            .clone()
            .or_else(|| item.snippet.clone())
            .filter(|d| !d.trim().is_empty());

        Some(Self {
            summary: item
                .title
                .clone()
                .unwrap_or_else(|| "Deadline".to_string()),
            description,
            start: due - Duration::hours(1),
            end: due,
        })
    }
}

impl CalendarClient {
    pub async fn from_refresh_token(google: &GoogleConfig, refresh_token: &str) -> Result<Self> {
        let secret = google_calendar3::yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: google.client_id.clone(),
            client_secret: google.client_secret.clone(),
            refresh_token: refresh_token.to_string(),
            key_type: "authorized_user".to_string(),
        };

        let auth = google_calendar3::yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .context("Failed to build authenticator from refresh token")?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            hub: CalendarHub::new(client, auth),
        })
    }

    /// Create an event in the primary calendar
    pub async fn create_event(&self, event: &CalendarEvent) -> Result<CreatedEvent> {
        let google_event = Event {
            summary: Some(event.summary.clone()),
            description: event.description.clone(),
            start: Some(EventDateTime {
                date_time: Some(event.start),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date_time: Some(event.end),
                ..Default::default()
            }),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .events()
            .insert(google_event, "primary")
            .doit()
            .await
            .context("Failed to create calendar event")?;

        tracing::info!(
            "Created calendar event: {} (id: {:?})",
            event.summary,
            created.id
        );

        Ok(CreatedEvent {
            id: created.id,
            html_link: created.html_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn item(due: Option<DateTime<Utc>>) -> MessageItem {
        let now = Utc::now();
        MessageItem {
            id: Uuid::new_v4(),
            source: "classroom".to_string(),
            external_id: "cw1".to_string(),
            course_id: None,
            title: Some("Problem Set 4".to_string()),
            snippet: Some("Eigenvalues".to_string()),
            body: None,
            message_type: Some("ASSIGNMENT".to_string()),
            due_datetime: due,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_deadline_event_spans_final_hour() {
        let due = Utc.with_ymd_and_hms(2025, 10, 17, 23, 59, 0).unwrap();
        let event = CalendarEvent::for_deadline(&item(Some(due))).unwrap();

        assert_eq!(event.summary, "Problem Set 4");
        assert_eq!(event.description.as_deref(), Some("Eigenvalues"));
        assert_eq!(event.end, due);
        assert_eq!(event.start, Utc.with_ymd_and_hms(2025, 10, 17, 22, 59, 0).unwrap());
    }

    #[test]
    fn test_no_event_without_deadline() {
        assert!(CalendarEvent::for_deadline(&item(None)).is_none());
    }
}
