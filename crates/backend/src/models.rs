// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// Database representation of users, including their stored Google tokens.
/// Never serialized to clients.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub google_id: Option<String>,
    pub email: String,
    pub display_name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for new inbox items
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::messages)]
pub struct NewMessage {
    pub source: String,
    pub external_id: String,
    pub course_id: Option<Uuid>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub message_type: Option<String>,
    pub due_datetime: Option<DateTime<Utc>>,
}

/// Insertable struct for attachments of an inbox item
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::attachments)]
pub struct NewAttachment {
    pub message_id: Uuid,
    pub name: String,
    pub mime_type: Option<String>,
    pub drive_file_id: Option<String>,
    pub url: Option<String>,
}
