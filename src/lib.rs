//! Helpdesk CRM client library
//!
//! Typed access to the tickets, customers, comments and staff of a
//! customer-support CRM hosted on Supabase, plus the OAuth session that
//! gates it.

pub mod auth;
pub mod cache;
pub mod comments;
pub mod config;
pub mod customers;
pub mod dashboard;
pub mod employees;
pub mod error;
pub mod fetch;
pub mod models;
pub mod postgrest;
pub mod seed;
pub mod tickets;
pub mod users;

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::auth::{AdminAuth, Auth};
use crate::cache::QueryCache;
use crate::comments::Comments;
use crate::config::CrmConfig;
use crate::customers::Customers;
use crate::dashboard::Dashboard;
use crate::employees::Employees;
use crate::error::{Error, Result};
use crate::postgrest::{PostgrestClient, TableQuery};
use crate::tickets::Tickets;
use crate::users::UserDirectory;

/// The main entry point for the CRM client
#[derive(Debug, Clone)]
pub struct Crm {
    config: CrmConfig,
    http_client: Client,
    auth: Auth,
    cache: QueryCache,
}

impl Crm {
    /// Create a client from a configuration
    ///
    /// # Example
    ///
    /// ```
    /// use helpdesk_crm::{Crm, config::CrmConfig};
    ///
    /// let config = CrmConfig::new("https://your-project-url.supabase.co", "your-anon-key").unwrap();
    /// let crm = Crm::new(config).unwrap();
    /// let query = crm.from("tickets");
    /// ```
    pub fn new(config: CrmConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let auth = Auth::new(
            &config.url,
            &config.anon_key,
            http_client.clone(),
            config.oauth_redirect_to.clone(),
        );
        let cache = QueryCache::new(config.stale_time);

        Ok(Self {
            config,
            http_client,
            auth,
            cache,
        })
    }

    /// Create a client from `SUPABASE_URL` / `SUPABASE_ANON_KEY`
    pub fn from_env() -> Result<Self> {
        Self::new(CrmConfig::from_env()?)
    }

    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    /// Session gate for the signed-in agent
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Admin client; requires the service role key
    pub fn admin(&self) -> Result<AdminAuth> {
        let key = self
            .config
            .service_role_key
            .as_deref()
            .ok_or_else(|| Error::config("service role key is not configured"))?;
        Ok(AdminAuth::new(&self.config.url, key, self.http_client.clone()))
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Database client, authenticated as the signed-in user when there is one
    pub fn postgrest(&self) -> PostgrestClient {
        let client = PostgrestClient::new(&self.config.url, &self.config.anon_key, self.http_client.clone())
            .with_retries(self.config.fetch_retries);
        match self.auth.access_token() {
            Some(token) => client.with_auth(&token),
            None => client,
        }
    }

    /// Start a query against a table or view
    pub fn from(&self, table: &str) -> TableQuery {
        self.postgrest().from(table)
    }

    /// Call a database function
    pub async fn rpc<P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<R> {
        self.postgrest().rpc(function, params).await
    }

    pub fn customers(&self) -> Customers<'_> {
        Customers::new(self)
    }

    pub fn tickets(&self) -> Tickets<'_> {
        Tickets::new(self)
    }

    pub fn comments(&self) -> Comments<'_> {
        Comments::new(self)
    }

    pub fn employees(&self) -> Employees<'_> {
        Employees::new(self)
    }

    pub fn users(&self) -> UserDirectory<'_> {
        UserDirectory::new(self)
    }

    pub fn dashboard(&self) -> Dashboard<'_> {
        Dashboard::new(self)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{OAuthProvider, Session};
    pub use crate::config::CrmConfig;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::tickets::{TicketPage, TicketQuery};
    pub use crate::Crm;
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_admin_requires_service_key() {
        let crm = Crm::new(CrmConfig::new("https://demo.supabase.co", "anon").unwrap()).unwrap();
        assert!(matches!(crm.admin(), Err(Error::Config(_))));

        let config = CrmConfig::new("https://demo.supabase.co", "anon")
            .unwrap()
            .with_service_role_key("service");
        assert!(Crm::new(config).unwrap().admin().is_ok());
    }

    #[tokio::test]
    async fn test_queries_use_session_token_once_signed_in() {
        let mock_server = MockServer::start().await;
        let crm = test_support::signed_in_crm(&mock_server);
        let token = crm.auth().access_token().unwrap();

        Mock::given(method("GET"))
            .and(path("/rest/v1/tickets"))
            .and(header("apikey", "anon"))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rows: Vec<serde_json::Value> = crm.from("tickets").execute().await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_queries_fall_back_to_anon_key() {
        let mock_server = MockServer::start().await;
        let crm = test_support::crm(&mock_server);

        Mock::given(method("GET"))
            .and(path("/rest/v1/customers"))
            .and(header("authorization", "Bearer anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rows: Vec<serde_json::Value> = crm.from("customers").execute().await.unwrap();
        assert!(rows.is_empty());
    }
}
