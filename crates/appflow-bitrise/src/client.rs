//! Bitrise REST API client
//!
//! One authenticated JSON request per call. The client does not interpret
//! HTTP status codes; callers decide what a response means.

use crate::config::BitriseConfig;
use crate::error::{BitriseError, Result};
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

/// Status and fully-read body of a response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: reqwest::StatusCode,
    pub body: Vec<u8>,
}

/// Authenticated JSON-over-HTTPS client
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: &BitriseConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path relative to the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send one request and return the response whatever its status
    ///
    /// The body is read to the end before returning, which hands the
    /// connection back to the pool.
    pub async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<RawResponse>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            let encoded = serde_json::to_vec(body).map_err(BitriseError::Encoding)?;
            request = request.body(encoded);
        }

        tracing::debug!("{} {}", method, url);
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        tracing::debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let config = BitriseConfig::new("tok").with_base_url("https://api.example.com/v0.1/");
        let client = ApiClient::new(&config).unwrap();

        assert_eq!(client.base_url(), "https://api.example.com/v0.1");
        assert_eq!(
            client.url("/apps/register"),
            "https://api.example.com/v0.1/apps/register"
        );
        assert_eq!(
            client.url("apps/abc/finish"),
            "https://api.example.com/v0.1/apps/abc/finish"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let client = ApiClient::new(&BitriseConfig::new("super-secret")).unwrap();
        assert!(!format!("{client:?}").contains("super-secret"));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = BitriseConfig::new("tok").with_timeout(std::time::Duration::ZERO);
        assert!(matches!(
            ApiClient::new(&config),
            Err(BitriseError::InvalidConfig(_))
        ));
    }
}
