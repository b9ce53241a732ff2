//! Types for authentication and user management

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Session;

/// An authenticated user as returned by the auth service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: String,

    /// The user's email address
    #[serde(default)]
    pub email: Option<String>,

    /// The user's phone number
    #[serde(default)]
    pub phone: Option<String>,

    /// The app metadata
    #[serde(default)]
    pub app_metadata: serde_json::Value,

    /// The user metadata (`full_name`, `avatar_url` for OAuth users)
    #[serde(default)]
    pub user_metadata: serde_json::Value,

    /// The user's role
    #[serde(default)]
    pub role: Option<String>,

    /// The creation time
    #[serde(default)]
    pub created_at: Option<String>,
}

impl User {
    /// `full_name` from the user metadata, if the provider supplied one
    pub fn full_name(&self) -> Option<&str> {
        self.user_metadata.get("full_name").and_then(|v| v.as_str())
    }
}

/// Identity providers offered on the sign-in screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    #[default]
    Google,
    Github,
    Azure,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Notification sent to `on_auth_state_change` subscribers
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Payload for creating a user with the service role
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminUserAttributes {
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    pub email_confirm: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<serde_json::Value>,
}
