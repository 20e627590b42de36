//! HTTP client for the Vision REST API.
//!
//! Authenticates once against the login endpoint, keeps the returned session
//! cookie, and attaches it to every subsequent request. Bodies are XML text
//! passed through untouched; the server answers with XML that callers pick
//! apart with [`crate::xml`].

use super::session::Session;
use super::xml::XmlError;
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER, SET_COOKIE, USER_AGENT};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Header that tells the server which verb a physical POST stands for.
pub const METHOD_OVERRIDE_HEADER: &str = "X-Vision-REST-Method";

const XML_CONTENT_TYPE: &str = "application/xml";

/// Longest response body kept in a [`ClientError::Request`].
const MAX_ERROR_BODY: usize = 512;

/// Logical request verb.
///
/// The server only accepts GET and POST, so `Put` and `Delete` travel as a
/// POST carrying [`METHOD_OVERRIDE_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Plain GET
    Get,
    /// Plain POST
    Post,
    /// POST with `X-Vision-REST-Method: PUT`
    Put,
    /// POST with `X-Vision-REST-Method: DELETE`
    Delete,
}

impl Verb {
    /// Value of the override header for this verb, if it needs one.
    #[must_use]
    pub fn override_method(self) -> Option<&'static str> {
        match self {
            Self::Get | Self::Post => None,
            Self::Put => Some("PUT"),
            Self::Delete => Some("DELETE"),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Vision client configuration.
#[derive(Debug, Clone)]
pub struct VisionClientConfig {
    /// Base URL of the Vision server (e.g., <http://localhost:7070>)
    pub base_url: String,
    /// Socket timeout applied to every request
    pub timeout: Duration,
    /// Optional `Referer` sent on authenticated requests
    pub referer: Option<String>,
    /// `User-Agent` sent on every request
    pub user_agent: String,
}

impl Default for VisionClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7070".to_string(),
            timeout: Duration::from_secs(30),
            referer: None,
            user_agent: "Mozilla/4.0".to_string(),
        }
    }
}

impl VisionClientConfig {
    /// Use the referer the Vision web console sends.
    #[must_use]
    pub fn with_console_referer(mut self) -> Self {
        self.referer = Some(format!(
            "{}/Vision.swf/[[DYNAMIC]]/6",
            self.base_url.trim_end_matches('/')
        ));
        self
    }
}

/// Session-based HTTP/XML client.
///
/// Starts unauthenticated; [`VisionClient::login`] moves it to the
/// authenticated state. Connections are not reused between requests.
pub struct VisionClient {
    client: Client,
    config: VisionClientConfig,
    session: Option<Session>,
}

impl VisionClient {
    /// Create a new, unauthenticated client.
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is not an absolute http(s) URL or the
    /// HTTP client cannot be created.
    pub fn new(config: VisionClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ClientError::Init(format!("invalid base URL {}: {e}", config.base_url)))?;

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(0);

        match base.scheme() {
            "http" => {}
            "https" => builder = builder.use_rustls_tls(),
            other => {
                return Err(ClientError::Init(format!(
                    "unsupported URL scheme {other:?}"
                )))
            }
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        Ok(Self {
            client,
            config,
            session: None,
        })
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &VisionClientConfig {
        &self.config
    }

    /// Current session, if logged in.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether [`VisionClient::login`] has succeeded.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Resolve a request path against the base URL. Absolute URLs pass through.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Log in by posting `credentials` (an XML document) to `path`.
    ///
    /// The first `Set-Cookie` header of a 2xx response becomes the session.
    /// A failed login leaves the client unauthenticated, even if an earlier
    /// login had succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] on network failure,
    /// [`ClientError::Request`] on a non-2xx status and [`ClientError::Auth`]
    /// if the response carries no usable cookie.
    pub async fn login(&mut self, path: &str, credentials: &str) -> Result<Session, ClientError> {
        self.session = None;
        let url = self.url(path);

        tracing::debug!(url, "POST login");

        let response = self
            .client
            .post(&url)
            .header(METHOD_OVERRIDE_HEADER, "PUT")
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header(USER_AGENT, self.config.user_agent.as_str())
            .body(credentials.to_string())
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "Login rejected");
            return Err(ClientError::request(status.as_u16(), &body));
        }

        let session = set_cookie
            .as_deref()
            .and_then(Session::from_set_cookie)
            .ok_or_else(|| {
                ClientError::Auth("login response carried no Set-Cookie header".to_string())
            })?;

        tracing::info!(url, "Logged in");
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Send an authenticated request and return the raw response body.
    ///
    /// Fails before touching the network if the client is not logged in.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Auth`] when unauthenticated,
    /// [`ClientError::Transport`] on network failure and
    /// [`ClientError::Request`] on a non-2xx status.
    pub async fn request(
        &self,
        verb: Verb,
        path: &str,
        body: Option<&str>,
    ) -> Result<String, ClientError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ClientError::Auth("not logged in".to_string()))?;
        let url = self.url(path);

        tracing::debug!(%verb, url, "Sending request");

        let mut request = match verb {
            Verb::Get => self.client.get(&url),
            Verb::Post | Verb::Put | Verb::Delete => self.client.post(&url),
        };
        request = request
            .header(COOKIE, session.cookie())
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header(USER_AGENT, self.config.user_agent.as_str());

        if let Some(method) = verb.override_method() {
            request = request.header(METHOD_OVERRIDE_HEADER, method);
        }
        if let Some(referer) = &self.config.referer {
            request = request.header(REFERER, referer.as_str());
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(%verb, url, status = status.as_u16(), "Request failed");
            return Err(ClientError::request(status.as_u16(), &text));
        }

        tracing::debug!(%verb, url, status = status.as_u16(), bytes = text.len(), "Response received");
        Ok(text)
    }

    /// GET `path`.
    ///
    /// # Errors
    ///
    /// See [`VisionClient::request`].
    pub async fn get(&self, path: &str) -> Result<String, ClientError> {
        self.request(Verb::Get, path, None).await
    }

    /// POST `body` to `path`.
    ///
    /// # Errors
    ///
    /// See [`VisionClient::request`].
    pub async fn post(&self, path: &str, body: &str) -> Result<String, ClientError> {
        self.request(Verb::Post, path, Some(body)).await
    }

    /// PUT `body` to `path` (POST with method override).
    ///
    /// # Errors
    ///
    /// See [`VisionClient::request`].
    pub async fn put(&self, path: &str, body: &str) -> Result<String, ClientError> {
        self.request(Verb::Put, path, Some(body)).await
    }

    /// DELETE `path` (POST with method override).
    ///
    /// # Errors
    ///
    /// See [`VisionClient::request`].
    pub async fn delete(&self, path: &str) -> Result<String, ClientError> {
        self.request(Verb::Delete, path, None).await
    }
}

/// Errors that can occur with the Vision client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Client initialization failed
    #[error("client init error: {0}")]
    Init(String),
    /// Connection or socket failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Missing or rejected session
    #[error("auth error: {0}")]
    Auth(String),
    /// Server answered with a non-2xx status
    #[error("request failed (status {status}): {body}")]
    Request {
        /// HTTP status code
        status: u16,
        /// Start of the response body
        body: String,
    },
    /// Response body could not be interpreted
    #[error("parse error: {0}")]
    Parse(#[from] XmlError),
}

impl ClientError {
    fn request(status: u16, body: &str) -> Self {
        Self::Request {
            status,
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        }
    }
}
