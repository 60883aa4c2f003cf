//! Minimal JSON REST client shared by the external collaborators

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Collaborator calls never hang the background task for long
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// REST client bound to one base URL and an optional API key
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Full URL for a path below the base URL
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    /// GET a JSON document; `None` on 404
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, RestError> {
        let response = self
            .authorized(self.client.get(self.url(path)))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(RestError::Request)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Api { status: status.as_u16(), body });
        }

        response.json().await.map(Some).map_err(RestError::Parse)
    }

    /// POST a JSON body
    pub async fn post_json<T: Serialize>(&self, path: &str, data: &T) -> Result<(), RestError> {
        let body = serde_json::to_vec(data)?;
        self.post_raw(path, body, &[]).await
    }

    /// POST pre-encoded JSON bytes with extra headers (signed payloads)
    pub async fn post_raw(
        &self,
        path: &str,
        body: Vec<u8>,
        headers: &[(&'static str, String)],
    ) -> Result<(), RestError> {
        let mut request = self
            .authorized(self.client.post(self.url(path)))
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.body(body).send().await.map_err(RestError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Api { status: status.as_u16(), body });
        }

        Ok(())
    }
}

/// Collaborator REST errors
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = RestClient::new("https://results.example.com/", None);
        assert_eq!(client.url("/matches"), "https://results.example.com/matches");
        assert_eq!(client.url("agents/1"), "https://results.example.com/agents/1");
        assert_eq!(client.url(""), "https://results.example.com");
    }
}
