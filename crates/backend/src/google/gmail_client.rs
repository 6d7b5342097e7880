//! Gmail API client for pulling inbox messages into the aggregated feed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, MessagePart};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::GoogleConfig;

pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

/// Email message fetched from Gmail
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub snippet: String,
    pub body_text: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub attachments: Vec<EmailAttachment>,
}

/// File attached to an email; the content itself stays in Gmail
#[derive(Debug, Clone, PartialEq)]
pub struct EmailAttachment {
    pub filename: String,
    pub mime_type: Option<String>,
}

impl GmailClient {
    /// Create a client that authenticates with a stored refresh token
    pub async fn from_refresh_token(google: &GoogleConfig, refresh_token: &str) -> Result<Self> {
        // yup_oauth2 as re-exported by google_gmail1 to avoid a version mismatch
        let secret = google_gmail1::yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: google.client_id.clone(),
            client_secret: google.client_secret.clone(),
            refresh_token: refresh_token.to_string(),
            key_type: "authorized_user".to_string(),
        };

        let auth = google_gmail1::yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .context("Failed to build authenticator from refresh token")?;

        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            hub: Gmail::new(client, auth),
        })
    }

    /// Fetch the most recent inbox messages
    pub async fn fetch_messages(&self, max_results: u32) -> Result<Vec<EmailMessage>> {
        let (_, list_response) = self
            .hub
            .users()
            .messages_list("me")
            .add_label_ids("INBOX")
            .max_results(max_results)
            .doit()
            .await
            .context("Failed to list messages")?;

        let mut emails = Vec::new();

        for id in list_response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
        {
            match self.get_message(&id).await {
                Ok(email) => emails.push(email),
                Err(e) => {
                    tracing::warn!("Failed to fetch message {}: {}", id, e);
                }
            }
        }

        Ok(emails)
    }

    pub async fn get_message(&self, message_id: &str) -> Result<EmailMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", message_id)
            .format("full")
            .doit()
            .await
            .context("Failed to get message")?;

        Ok(parse_message(message))
    }
}

fn parse_message(message: Message) -> EmailMessage {
    let mut subject = String::new();
    let mut from = String::new();
    let mut received_at = None;

    if let Some(headers) = message.payload.as_ref().and_then(|p| p.headers.as_ref()) {
        for header in headers {
            let value = header.value.clone().unwrap_or_default();
            match header.name.as_deref() {
                Some("Subject") => subject = value,
                Some("From") => from = value,
                Some("Date") => received_at = parse_date(&value),
                _ => {}
            }
        }
    }

    // Fall back to Gmail's own receive timestamp (epoch millis)
    if received_at.is_none() {
        received_at = message
            .internal_date
            .and_then(DateTime::<Utc>::from_timestamp_millis);
    }

    let mut attachments = Vec::new();
    let mut body_text = None;
    if let Some(payload) = &message.payload {
        body_text = extract_text_body(payload);
        collect_attachments(payload, &mut attachments);
    }

    EmailMessage {
        id: message.id.unwrap_or_default(),
        subject,
        from,
        snippet: message.snippet.unwrap_or_default(),
        body_text,
        received_at,
        attachments,
    }
}

fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// First `text/plain` body, searching nested multiparts depth first
fn extract_text_body(part: &MessagePart) -> Option<String> {
    let mime = part.mime_type.as_deref().unwrap_or_default();

    if mime == "text/plain" || (mime.is_empty() && part.parts.is_none()) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            if let Ok(text) = String::from_utf8(data.clone()) {
                return Some(text);
            }
        }
    }

    part.parts
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find_map(extract_text_body)
}

fn collect_attachments(part: &MessagePart, out: &mut Vec<EmailAttachment>) {
    if let Some(filename) = part.filename.as_deref().filter(|f| !f.is_empty()) {
        out.push(EmailAttachment {
            filename: filename.to_string(),
            mime_type: part.mime_type.clone(),
        });
    }

    for child in part.parts.as_deref().unwrap_or_default() {
        collect_attachments(child, out);
    }
}
