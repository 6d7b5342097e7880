use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod events;

pub use events::{BroadcastMessage, ClientAction};

/// Course struct matching database column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Course {
    pub id: Uuid,
    pub course_id: String, // Google Classroom course ID
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregated inbox item (Gmail message, Classroom coursework or manual entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct MessageItem {
    pub id: Uuid,
    pub source: String, // stored as VARCHAR: "gmail", "classroom", "manual"
    pub external_id: String,
    pub course_id: Option<Uuid>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub message_type: Option<String>,
    pub due_datetime: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Attachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub name: String,
    pub mime_type: Option<String>,
    pub drive_file_id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSource {
    Gmail,
    Classroom,
    Manual,
}

impl MessageSource {
    pub fn as_str(&self) -> &str {
        match self {
            MessageSource::Gmail => "gmail",
            MessageSource::Classroom => "classroom",
            MessageSource::Manual => "manual",
        }
    }
}

// API Request/Response types

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub name: String,
    pub mime_type: Option<String>,
    pub url: Option<String>,
}

impl From<Attachment> for AttachmentResponse {
    fn from(attachment: Attachment) -> Self {
        AttachmentResponse {
            id: attachment.id,
            name: attachment.name,
            mime_type: attachment.mime_type,
            url: attachment.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub source: String,
    pub external_id: String,
    pub course_id: Option<Uuid>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub message_type: Option<String>,
    pub due_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<AttachmentResponse>,
}

impl MessageResponse {
    pub fn with_attachments(item: MessageItem, attachments: Vec<Attachment>) -> Self {
        MessageResponse {
            id: item.id,
            source: item.source,
            external_id: item.external_id,
            course_id: item.course_id,
            title: item.title,
            snippet: item.snippet,
            message_type: item.message_type,
            due_datetime: item.due_datetime,
            attachments: attachments.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<MessageItem> for MessageResponse {
    fn from(item: MessageItem) -> Self {
        MessageResponse::with_attachments(item, Vec::new())
    }
}

/// Everything a connected client should currently know, fetched in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextSnapshot {
    pub generated_at: Option<DateTime<Utc>>,
    pub courses: Vec<Course>,
    pub messages: Vec<MessageResponse>,
    /// Items with a due date in the future, soonest first
    pub deadlines: Vec<MessageResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttachmentRequest {
    pub name: String,
    pub mime_type: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    pub title: String,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub message_type: Option<String>,
    pub due_datetime: Option<DateTime<Utc>>,
    pub course_id: Option<Uuid>,
    #[serde(default)]
    pub attachments: Vec<NewAttachmentRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SummarizeRequest {
    pub max_sentences: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub message_id: Uuid,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEventResponse {
    pub message_id: Uuid,
    pub event_id: Option<String>,
    pub html_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub users: usize,
    pub new_items: usize,
}

/// Minimal acknowledgement body, e.g. `{"status": "ok"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        StatusResponse {
            status: "ok".to_string(),
        }
    }
}
