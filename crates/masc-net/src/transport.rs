//! Transport
//!
//! The seam between the fetcher and the wire. [`HttpTransport`] sends
//! `http(s)` requests with a blocking reqwest client on smol's blocking
//! pool and reads `file:` URLs from disk.

use std::fmt;
use std::future::Future;

use tracing::debug;

use crate::NetError;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }

    /// Parse a method name, case-insensitively. Unknown names give `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let method = match name.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            _ => return None,
        };
        Some(method)
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic-auth credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user: &str, password: Option<&str>) -> Self {
        Self {
            user: user.to_string(),
            password: password.map(str::to_string),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A request as handed to the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub credentials: Option<Credentials>,
}

/// Raw response; the fetcher decides whether it counts as success
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// `None` when the scheme has no status (local files)
    pub status: Option<u16>,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Something that can carry a request and bring back a response.
///
/// Errors are failures below HTTP (connection refused, unreadable file);
/// any response with a status is returned as `Ok`.
pub trait Transport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, NetError>>;
}

/// reqwest-backed transport for `http`, `https` and `file` URLs
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, NetError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| NetError::Configuration(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, NetError> {
        let parsed = ::url::Url::parse(&request.url)
            .map_err(|err| NetError::InvalidUrl(format!("{}: {err}", request.url)))?;

        if parsed.scheme() == "file" {
            return read_file(&parsed).await;
        }

        let client = self.client.clone();
        smol::unblock(move || send_blocking(&client, request)).await
    }
}

fn send_blocking(
    client: &reqwest::blocking::Client,
    request: TransportRequest,
) -> Result<TransportResponse, NetError> {
    let mut builder = client.request(request.method.to_reqwest(), &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(credentials) = &request.credentials {
        builder = builder.basic_auth(&credentials.user, credentials.password.as_ref());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder
        .send()
        .map_err(|err| NetError::transport(0, err.to_string()))?;

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .text()
        .map_err(|err| NetError::transport(status.as_u16(), err.to_string()))?;

    debug!(status = status.as_u16(), bytes = body.len(), "response received");

    Ok(TransportResponse {
        status: Some(status.as_u16()),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
    })
}

async fn read_file(url: &::url::Url) -> Result<TransportResponse, NetError> {
    let path = url
        .to_file_path()
        .map_err(|()| NetError::InvalidUrl(url.to_string()))?;
    let body = smol::fs::read_to_string(&path)
        .await
        .map_err(|err| NetError::transport(0, format!("{}: {err}", path.display())))?;

    debug!(path = %path.display(), bytes = body.len(), "local file read");

    Ok(TransportResponse {
        status: None,
        body,
        ..Default::default()
    })
}
