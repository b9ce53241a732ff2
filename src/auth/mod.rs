//! Authentication gate backed by the hosted identity provider

mod session;
mod types;

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchBuilder};

pub use session::*;
pub use types::*;

#[cfg(test)]
pub(crate) use session::tests::token_for;

const EVENT_CAPACITY: usize = 16;

/// Client for Supabase Authentication
#[derive(Debug, Clone)]
pub struct Auth {
    url: String,
    key: String,
    client: Client,
    redirect_to: Option<String>,
    session: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Auth {
    /// Create a new Auth client
    pub fn new(url: &str, key: &str, client: Client, redirect_to: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            client,
            redirect_to,
            session: Arc::new(RwLock::new(None)),
            events,
        }
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    fn with_key<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        fetch.header("apikey", &self.key)
    }

    fn store(&self, session: Option<Session>) {
        let mut guard = match self.session.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = session;
    }

    fn emit(&self, kind: AuthChangeEvent) {
        debug!(?kind, "auth state change");
        // Nobody listening is fine.
        let _ = self.events.send(AuthEvent {
            kind,
            session: self.get_session(),
        });
    }

    /// URL to send the browser to for provider sign-in. The provider
    /// redirects back to `redirect_to` (or the configured default) with the
    /// session in the URL fragment.
    pub fn sign_in_with_oauth_url(
        &self,
        provider: OAuthProvider,
        redirect_to: Option<&str>,
    ) -> String {
        let mut url = self.get_auth_url(&format!("/authorize?provider={}", provider));
        if let Some(redirect_to) = redirect_to.or(self.redirect_to.as_deref()) {
            url.push_str(&format!(
                "&redirect_to={}",
                urlencoding::encode(redirect_to)
            ));
        }
        url
    }

    /// Complete an OAuth sign-in from the URL the provider redirected to.
    pub fn session_from_redirect(&self, redirect: &str) -> Result<Session> {
        let session = Session::from_redirect_url(redirect)?;
        info!(user_id = ?session.user_id(), "signed in");
        self.set_session(session.clone());
        Ok(session)
    }

    /// Get the current session
    pub fn get_session(&self) -> Option<Session> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Set the session
    pub fn set_session(&self, session: Session) {
        self.store(Some(session));
        self.emit(AuthChangeEvent::SignedIn);
    }

    /// Access token of a live session
    pub fn access_token(&self) -> Option<String> {
        self.get_session()
            .filter(|s| !s.is_expired())
            .map(|s| s.access_token)
    }

    fn require_token(&self) -> Result<String> {
        self.get_session()
            .map(|s| s.access_token)
            .ok_or(Error::MissingSession)
    }

    /// Subscribe to sign-in, sign-out and refresh notifications
    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Get the user data for the currently authenticated user
    pub async fn get_user(&self) -> Result<User> {
        let token = self.require_token()?;
        let url = self.get_auth_url("/user");
        self.with_key(Fetch::get(&self.client, &url))
            .bearer_auth(&token)
            .execute::<User>()
            .await
    }

    /// Exchange the refresh token for a new session
    pub async fn refresh_session(&self) -> Result<Session> {
        let current = self.get_session().ok_or(Error::MissingSession)?;
        let url = self.get_auth_url("/token?grant_type=refresh_token");

        let mut session: Session = self
            .with_key(Fetch::post(&self.client, &url))
            .json(&json!({ "refresh_token": current.refresh_token }))?
            .execute()
            .await?;
        if session.user.is_none() {
            session.user = current.user;
        }
        if session.expires_at.is_none() {
            session.expires_at = Some(Utc::now().timestamp() + session.expires_in);
        }

        self.store(Some(session.clone()));
        self.emit(AuthChangeEvent::TokenRefreshed);
        Ok(session)
    }

    /// Sign out the current user. The local session is dropped even when
    /// the server call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let token = self.require_token()?;
        let url = self.get_auth_url("/logout");

        let result = self
            .with_key(Fetch::post(&self.client, &url))
            .bearer_auth(&token)
            .execute_empty()
            .await;

        self.store(None);
        self.emit(AuthChangeEvent::SignedOut);
        info!("signed out");
        result
    }
}

/// Auth admin client, authenticated with the service role key
#[derive(Debug, Clone)]
pub struct AdminAuth {
    url: String,
    service_role_key: String,
    client: Client,
}

impl AdminAuth {
    pub fn new(url: &str, service_role_key: &str, client: Client) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
            client,
        }
    }

    /// Create a user directly, bypassing sign-up
    pub async fn create_user(&self, attributes: &AdminUserAttributes) -> Result<User> {
        let url = format!("{}/auth/v1/admin/users", self.url);
        info!(email = %attributes.email, "creating auth user");
        Fetch::post(&self.client, &url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(attributes)?
            .execute::<User>()
            .await
    }
}
