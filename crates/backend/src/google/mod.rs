//! Google API integrations: OAuth tokens, Gmail, Classroom and Calendar.

pub mod calendar_client;
pub mod classroom_client;
pub mod gmail_client;
pub mod oauth;

pub use calendar_client::{CalendarClient, CalendarEvent};
pub use classroom_client::ClassroomClient;
pub use gmail_client::GmailClient;
