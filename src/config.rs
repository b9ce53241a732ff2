//! Configuration options for the CRM client

use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Configuration options for the CRM client
#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// Base URL of the Supabase project
    pub url: String,

    /// Public (anon) API key
    pub anon_key: String,

    /// Service role key, only needed for admin operations such as seeding
    pub service_role_key: Option<String>,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Age after which a cached query result is fetched again
    pub stale_time: Duration,

    /// Extra attempts for a read that failed transiently
    pub fetch_retries: u32,

    /// Where the identity provider sends the browser after OAuth sign-in
    pub oauth_redirect_to: Option<String>,
}

impl CrmConfig {
    /// Create a configuration, validating the URL and key.
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        Url::parse(url)?;
        if anon_key.is_empty() {
            return Err(Error::config("anon key cannot be empty"));
        }

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            service_role_key: None,
            request_timeout: Some(Duration::from_secs(30)),
            stale_time: Duration::ZERO,
            fetch_retries: 1,
            oauth_redirect_to: None,
        })
    }

    /// Load the configuration from the environment, reading `.env` first.
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required; the `VITE_`
    /// prefixed names used by the browser build are accepted as fallbacks.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let url = env_any(&["SUPABASE_URL", "VITE_SUPABASE_URL"])
            .ok_or_else(|| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = env_any(&["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"])
            .ok_or_else(|| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;

        let mut config = Self::new(&url, &anon_key)?;
        config.service_role_key = env_any(&["SUPABASE_SERVICE_ROLE_KEY"]);
        config.oauth_redirect_to = env_any(&["CRM_REDIRECT_URL"]);
        Ok(config)
    }

    /// Configuration that sends the service role key on every request,
    /// for administrative tooling. Reads `.env` first.
    pub fn service_from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let url = env_any(&["SUPABASE_URL", "VITE_SUPABASE_URL"])
            .ok_or_else(|| Error::config("SUPABASE_URL environment variable not found"))?;
        let service_key = env_any(&["SUPABASE_SERVICE_ROLE_KEY"]).ok_or_else(|| {
            Error::config("SUPABASE_SERVICE_ROLE_KEY environment variable not found")
        })?;

        Ok(Self::new(&url, &service_key)?.with_service_role_key(&service_key))
    }

    /// Set the service role key
    pub fn with_service_role_key(mut self, value: &str) -> Self {
        self.service_role_key = Some(value.to_string());
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the cache staleness window
    pub fn with_stale_time(mut self, value: Duration) -> Self {
        self.stale_time = value;
        self
    }

    /// Set the number of retries for failed reads
    pub fn with_fetch_retries(mut self, value: u32) -> Self {
        self.fetch_retries = value;
        self
    }

    /// Set the OAuth redirect target
    pub fn with_oauth_redirect_to(mut self, value: &str) -> Self {
        self.oauth_redirect_to = Some(value.to_string());
        self
    }
}

fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash_and_sets_defaults() {
        let config = CrmConfig::new("https://demo.supabase.co/", "anon").unwrap();
        assert_eq!(config.url, "https://demo.supabase.co");
        assert_eq!(config.fetch_retries, 1);
        assert_eq!(config.stale_time, Duration::ZERO);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(matches!(
            CrmConfig::new("not a url", "anon"),
            Err(Error::Url(_))
        ));
        assert!(matches!(
            CrmConfig::new("https://demo.supabase.co", ""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = CrmConfig::new("https://demo.supabase.co", "anon")
            .unwrap()
            .with_service_role_key("service")
            .with_stale_time(Duration::from_secs(60))
            .with_fetch_retries(3)
            .with_oauth_redirect_to("http://localhost:5173");
        assert_eq!(config.service_role_key.as_deref(), Some("service"));
        assert_eq!(config.stale_time, Duration::from_secs(60));
        assert_eq!(config.fetch_retries, 3);
        assert_eq!(
            config.oauth_redirect_to.as_deref(),
            Some("http://localhost:5173")
        );
    }
}
