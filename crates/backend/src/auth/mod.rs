//! Google OAuth login that connects a student's Classroom, Gmail and Calendar.

mod handlers;
mod state;

pub use handlers::{auth_callback, auth_start};
pub use state::OAuthStates;
