//! Session management for authentication

use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use url::Url;

use super::User;
use crate::error::{Error, Result};

/// Session data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The access token
    pub access_token: String,

    /// The refresh token
    pub refresh_token: String,

    /// The token type
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The lifetime in seconds
    pub expires_in: i64,

    /// The expiry timestamp (unix seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// The signed-in user
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Claims carried in a Supabase access token
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Read the claims of an access token. The signature is not checked;
/// the backend does that on every request.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| Error::InvalidToken(e.to_string()))
}

impl Session {
    /// Build a session from raw tokens, filling the user from the claims.
    pub fn from_tokens(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        expires_at: Option<i64>,
    ) -> Result<Self> {
        let claims = decode_claims(&access_token)?;
        let expires_at = expires_at
            .or(claims.exp)
            .unwrap_or_else(|| Utc::now().timestamp() + expires_in);

        Ok(Self {
            access_token,
            refresh_token,
            token_type: default_token_type(),
            expires_in,
            expires_at: Some(expires_at),
            user: Some(User {
                id: claims.sub,
                email: claims.email,
                role: claims.role,
                user_metadata: claims.user_metadata,
                ..Default::default()
            }),
        })
    }

    /// Parse the implicit-flow redirect the identity provider sends back,
    /// e.g. `https://app/#access_token=...&refresh_token=...&expires_in=3600`.
    pub fn from_redirect_url(redirect: &str) -> Result<Self> {
        let url = Url::parse(redirect)?;
        let raw = url
            .fragment()
            .filter(|f| !f.is_empty())
            .or_else(|| url.query())
            .ok_or_else(|| Error::auth("redirect URL carries no session"))?;

        let mut access_token = None;
        let mut refresh_token = None;
        let mut expires_in = 3600;
        let mut expires_at = None;
        let mut error = None;

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match &*key {
                "access_token" => access_token = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                "expires_in" => expires_in = value.parse().unwrap_or(expires_in),
                "expires_at" => expires_at = value.parse().ok(),
                "error_description" => error = Some(value.into_owned()),
                "error" if error.is_none() => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(Error::auth(error));
        }

        match (access_token, refresh_token) {
            (Some(access), Some(refresh)) => Self::from_tokens(access, refresh, expires_in, expires_at),
            _ => Err(Error::auth("redirect URL is missing access_token or refresh_token")),
        }
    }

    /// ID of the signed-in user
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now().timestamp() >= expires_at,
            None => false,
        }
    }
}
