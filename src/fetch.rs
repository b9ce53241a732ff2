//! HTTP client abstraction for making requests to the Supabase services

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Helper for building and executing HTTP requests
pub struct FetchBuilder<'a> {
    client: &'a Client,
    url: String,
    method: Method,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    retries: u32,
}

impl<'a> FetchBuilder<'a> {
    /// Create a new FetchBuilder
    pub fn new(client: &'a Client, url: &str, method: Method) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            client,
            url: url.to_string(),
            method,
            headers,
            query_params: Vec::new(),
            body: None,
            retries: 0,
        }
    }

    /// Add a header to the request. Invalid names or values are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "dropping invalid header"),
        }
        self
    }

    /// Add bearer token authentication to the request
    pub fn bearer_auth(self, token: &str) -> Self {
        self.header("Authorization", &format!("Bearer {}", token))
    }

    /// Append query parameters; repeated keys are kept.
    pub fn query(mut self, params: &[(String, String)]) -> Self {
        self.query_params.extend_from_slice(params);
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body)?;
        self.body = Some(json);
        Ok(self)
    }

    /// Re-send a read request up to `count` extra times on transient failure.
    /// Ignored for anything that is not GET or HEAD.
    pub fn retries(mut self, count: u32) -> Self {
        self.retries = count;
        self
    }

    fn build(&self) -> Result<RequestBuilder> {
        let mut url = Url::parse(&self.url)?;

        if !self.query_params.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                query_pairs.append_pair(key, value);
            }
        }

        let mut req = self.client.request(self.method.clone(), url.as_str());
        req = req.headers(self.headers.clone());

        if let Some(body) = &self.body {
            req = req.body(body.clone());
        }

        Ok(req)
    }

    fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    async fn send_once(&self) -> Result<Response> {
        let response = self.build()?.send().await?;
        let status = response.status();
        debug!(method = %self.method, url = %self.url, %status, "request completed");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_response(status, text));
        }
        Ok(response)
    }

    /// Send the request and return the successful response.
    pub async fn send(&self) -> Result<Response> {
        let attempts = if self.is_read() { self.retries + 1 } else { 1 };
        let mut attempt = 1;
        loop {
            match self.send_once().await {
                Err(e) if attempt < attempts && e.is_transient() => {
                    warn!(url = %self.url, attempt, error = %e, "retrying request");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Execute the request and parse the response as JSON.
    /// An empty body is decoded as JSON `null`.
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<T> {
        let response = self.send().await?;
        decode_body(response).await
    }

    /// Execute the request and also return the total row count announced
    /// in the `Content-Range` header.
    pub async fn execute_with_count<T: DeserializeOwned>(&self) -> Result<(T, Option<u64>)> {
        let response = self.send().await?;
        let count = content_range_total(&response);
        let body = decode_body(response).await?;
        Ok((body, count))
    }

    /// Execute the request, keeping only the `Content-Range` total.
    pub async fn execute_count(&self) -> Result<Option<u64>> {
        let response = self.send().await?;
        Ok(content_range_total(&response))
    }

    /// Execute the request and discard the response body
    pub async fn execute_empty(&self) -> Result<()> {
        self.send().await?;
        Ok(())
    }
}

async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_str(&text)?)
}

fn content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Parse the total out of a `Content-Range` value such as `0-24/3573` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Helper for creating HTTP requests
pub struct Fetch;

impl Fetch {
    /// Create a GET request
    pub fn get<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::GET)
    }

    /// Create a HEAD request
    pub fn head<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::HEAD)
    }

    /// Create a POST request
    pub fn post<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::POST)
    }

    /// Create a PATCH request
    pub fn patch<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::PATCH)
    }

    /// Create a DELETE request
    pub fn delete<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::DELETE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[tokio::test]
    async fn test_get_is_retried_once_on_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/flaky", mock_server.uri());
        let value: Value = Fetch::get(&client, &url).retries(1).execute().await.unwrap();
        assert_eq!(value["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_post_is_never_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/write"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/write", mock_server.uri());
        let result = Fetch::post(&client, &url)
            .retries(3)
            .json(&json!({}))
            .unwrap()
            .execute_empty()
            .await;
        assert!(matches!(result, Err(Error::UnparsedApi { .. })));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "no such table" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let url = format!("{}/missing", mock_server.uri());
        let result = Fetch::get(&client, &url).retries(1).execute::<Value>().await;
        match result {
            Err(Error::Api { details, .. }) => {
                assert_eq!(details.message.as_deref(), Some("no such table"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
