//! HTTP wrapper with Basic auth and WebDAV method support

use reqwest::{Client, Method, RequestBuilder, Response};

use crate::config::CalDavConfig;
use crate::error::{CalDavError, CalDavResult};

/// WebDAV methods reqwest has no constant for
pub fn dav_method(name: &str) -> Method {
    Method::from_bytes(name.as_bytes()).expect("static WebDAV method name")
}

/// Authenticated HTTP client for calendar operations
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: CalDavConfig,
}

impl HttpClient {
    pub fn new(config: CalDavConfig) -> CalDavResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self { client, config })
    }

    /// Build a request with Basic auth attached
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    /// Extract the ETag header, if the server sent one
    pub fn response_etag(resp: &Response) -> Option<String> {
        resp.headers()
            .get("ETag")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    }

    /// Turn a non-success status into an error with the body attached
    pub async fn error_for_status(resp: Response) -> CalDavError {
        let status = resp.status();
        let text = resp
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response body".to_string());
        CalDavError::Http(format!("{status}: {text}"))
    }
}
