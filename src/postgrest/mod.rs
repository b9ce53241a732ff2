//! Database operations through the PostgREST API

mod filter;
mod query;
mod types;

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::fetch::Fetch;

pub use filter::*;
pub use query::*;
pub use types::*;

/// Client for table and RPC requests
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    endpoint: Endpoint,
}

impl PostgrestClient {
    /// Create a client that authenticates with `key` alone
    pub fn new(url: &str, key: &str, client: Client) -> Self {
        Self {
            endpoint: Endpoint {
                url: url.trim_end_matches('/').to_string(),
                key: key.to_string(),
                token: None,
                client,
                retries: 0,
            },
        }
    }

    /// Send a user access token instead of the key as bearer
    pub fn with_auth(mut self, token: &str) -> Self {
        self.endpoint.token = Some(token.to_string());
        self
    }

    /// Retries for reads that fail transiently
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.endpoint.retries = retries;
        self
    }

    /// Start a query against a table or view
    pub fn from(&self, table: &str) -> TableQuery {
        TableQuery::new(self.endpoint.clone(), table)
    }

    /// Call a stored procedure or function
    pub async fn rpc<P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<R> {
        info!(function, "rpc");
        let url = format!("{}/rest/v1/rpc/{}", self.endpoint.url, function);
        self.endpoint
            .decorate(Fetch::post(&self.endpoint.client, &url))
            .json(params)?
            .execute()
            .await
    }

    /// Call a function that returns rows; a null result becomes empty.
    pub async fn rpc_rows<P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<Vec<R>> {
        let value: Value = self.rpc(function, params).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }
}
