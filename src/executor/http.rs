//! HTTP sender capability
//!
//! Blocking HTTP for step bodies: parameterised requests, a plain
//! response envelope and a download-to-file helper. Transport failures
//! map to the Infrastructure category; a delivered response is returned
//! whatever its status, and the step decides whether a 4xx/5xx is a
//! Service failure.

use crate::errors::StepError;
use std::path::Path;
use std::time::Duration;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request.
    Get,
    /// POST request.
    Post,
    /// PUT request.
    Put,
    /// PATCH request.
    Patch,
    /// DELETE request.
    Delete,
    /// HEAD request.
    Head,
}

impl HttpMethod {
    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Head => reqwest::Method::HEAD,
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Request timeout; the client default applies when unset.
    pub timeout: Option<Duration>,
    /// Basic auth credentials.
    pub basic_auth: Option<(String, String)>,
    /// Bearer token.
    pub bearer_token: Option<String>,
    /// Additional request headers.
    pub headers: Vec<(String, String)>,
    /// Cookies sent with the request.
    pub cookies: Vec<(String, String)>,
    /// Accept invalid TLS certificates.
    pub insecure: bool,
    /// Proxy URL.
    pub proxy: Option<String>,
}

impl HttpOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets basic auth credentials.
    #[must_use]
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    /// Sets a bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }
}

/// Response envelope handed back to the step.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as UTF-8 text, lossy.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns a Service-category [`StepError`] when the body is not
    /// valid JSON.
    pub fn json(&self) -> Result<serde_json::Value, StepError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| StepError::service(format!("response is not JSON: {e}")))
    }
}

/// HTTP capability of the utility bundle.
pub trait HttpSender: Send + Sync {
    /// Sends a request and returns the response envelope.
    ///
    /// # Errors
    ///
    /// Returns an Infrastructure-category [`StepError`] when the
    /// request cannot be delivered.
    fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Vec<u8>>,
        options: &HttpOptions,
    ) -> Result<HttpResponse, StepError>;

    /// Downloads a URL to a file.
    ///
    /// # Errors
    ///
    /// Returns an Infrastructure-category [`StepError`] on transport or
    /// write failure, and a Service-category error on a non-2xx status.
    fn download(&self, url: &str, target: &Path, options: &HttpOptions) -> Result<(), StepError>;
}

/// Real HTTP backing over a blocking client.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    default_timeout: Option<Duration>,
}

impl HttpClient {
    /// Creates a client with a 5 minute default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_timeout: Some(Duration::from_secs(300)),
        }
    }

    fn build_client(&self, options: &HttpOptions) -> Result<reqwest::blocking::Client, StepError> {
        let mut builder = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(options.insecure);
        if let Some(timeout) = options.timeout.or(self.default_timeout) {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| StepError::infrastructure(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| StepError::infrastructure(format!("cannot build HTTP client: {e}")))
    }

    fn build_request(
        client: &reqwest::blocking::Client,
        method: HttpMethod,
        url: &str,
        body: Option<Vec<u8>>,
        options: &HttpOptions,
    ) -> reqwest::blocking::RequestBuilder {
        let mut request = client.request(method.to_reqwest(), url);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        if !options.cookies.is_empty() {
            let cookie_line = options
                .cookies
                .iter()
                .map(|(n, v)| format!("{n}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(reqwest::header::COOKIE, cookie_line);
        }
        if let Some((user, password)) = &options.basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(token) = &options.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request
    }
}

impl HttpSender for HttpClient {
    fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Vec<u8>>,
        options: &HttpOptions,
    ) -> Result<HttpResponse, StepError> {
        let client = self.build_client(options)?;
        let request = Self::build_request(&client, method, url, body, options);
        tracing::debug!(method = ?method, url = %url, "Sending HTTP request");

        let response = request
            .send()
            .map_err(|e| StepError::infrastructure(format!("request to {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(n, v)| {
                (
                    n.to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| StepError::infrastructure(format!("reading response body: {e}")))?
            .to_vec();

        tracing::debug!(url = %url, status = status, "HTTP response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn download(&self, url: &str, target: &Path, options: &HttpOptions) -> Result<(), StepError> {
        let response = self.send(HttpMethod::Get, url, None, options)?;
        if !response.is_success() {
            return Err(StepError::service(format!(
                "download of {url} returned HTTP {}",
                response.status
            )));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StepError::infrastructure(e.to_string()))?;
        }
        std::fs::write(target, &response.body)
            .map_err(|e| StepError::infrastructure(format!("writing {}: {e}", target.display())))
    }
}
