//! Fetcher
//!
//! One request, one terminal callback. [`HttpFetcher::fetch`] is the
//! callback form; [`HttpFetcher::send`] returns the outcome instead and is
//! what the loader builds on.

use std::fmt;
use std::rc::Rc;

use masc_content::{JsonValue, XmlDocument, parse_json, parse_xml};
use tracing::{info, warn};

use crate::NetError;
use crate::host::Host;
use crate::transport::{Credentials, Method, Transport, TransportRequest, TransportResponse};
use crate::url::is_local_file;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

type LoadCallback = Box<dyn FnOnce(&FetchResponse)>;
type ErrorCallback = Box<dyn FnOnce(&NetError)>;

/// Request configuration
#[derive(Default)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub credentials: Option<Credentials>,
    /// Shown through [`Host::show_busy_indicator`] while the request runs
    pub busy_indicator: Option<String>,
    on_load: Option<LoadCallback>,
    on_error: Option<ErrorCallback>,
}

impl FetchRequest {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn post(url: &str, body: &str) -> Self {
        Self {
            method: Method::Post,
            url: url.to_string(),
            body: Some(body.to_string()),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_credentials(mut self, user: &str, password: Option<&str>) -> Self {
        self.credentials = Some(Credentials::new(user, password));
        self
    }

    pub fn with_busy_indicator(mut self, label: &str) -> Self {
        self.busy_indicator = Some(label.to_string());
        self
    }

    /// Called with the response when the request succeeds
    pub fn on_load(mut self, f: impl FnOnce(&FetchResponse) + 'static) -> Self {
        self.on_load = Some(Box::new(f));
        self
    }

    /// Called with the error when the request fails
    pub fn on_error(mut self, f: impl FnOnce(&NetError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn into_transport(self) -> TransportRequest {
        let mut headers = self.headers;
        match self.content_type {
            Some(content_type) => headers.push(("Content-Type".into(), content_type)),
            None if self.method == Method::Post && self.body.is_some() => {
                headers.push(("Content-Type".into(), FORM_CONTENT_TYPE.into()));
            }
            None => {}
        }

        TransportRequest {
            method: self.method,
            url: self.url,
            headers,
            body: self.body,
            credentials: self.credentials,
        }
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("content_type", &self.content_type)
            .field("has_body", &self.body.is_some())
            .field("busy_indicator", &self.busy_indicator)
            .finish_non_exhaustive()
    }
}

/// A completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    /// `None` for local files
    pub status: Option<u16>,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub text: String,
}

impl FetchResponse {
    fn new(url: String, response: TransportResponse) -> Self {
        Self {
            url,
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            text: response.body,
        }
    }

    /// 200 and 304 succeed, as does a local file read with no status
    pub fn is_ok(&self) -> bool {
        match self.status {
            Some(status) => status == 200 || status == 304,
            None => is_local_file(&self.url),
        }
    }

    /// Get header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Result<JsonValue, NetError> {
        Ok(parse_json(&self.text)?)
    }

    pub fn xml(&self) -> Result<XmlDocument, NetError> {
        Ok(parse_xml(&self.text)?)
    }

    fn failure(&self) -> NetError {
        let code = self.status.unwrap_or(0);
        let description = match (self.status, self.status_text.is_empty()) {
            (None, _) => "no status reported".to_string(),
            (Some(_), true) => format!("HTTP status {code}"),
            (Some(_), false) => self.status_text.clone(),
        };
        NetError::transport(code, description)
    }
}

/// Fires exactly one of the request's callbacks, once
struct Completion {
    on_load: Option<LoadCallback>,
    on_error: Option<ErrorCallback>,
}

impl Completion {
    fn finish(self, url: &str, outcome: Result<FetchResponse, NetError>) -> Option<FetchResponse> {
        match outcome {
            Ok(response) => {
                if let Some(on_load) = self.on_load {
                    on_load(&response);
                }
                Some(response)
            }
            Err(err) => {
                match self.on_error {
                    Some(on_error) => on_error(&err),
                    None => warn!(url, error = %err, "unhandled fetch error"),
                }
                None
            }
        }
    }
}

/// Shows the busy indicator until dropped
struct BusyIndicator<'a> {
    host: &'a dyn Host,
    label: Option<String>,
}

impl<'a> BusyIndicator<'a> {
    fn show(host: &'a dyn Host, label: Option<String>) -> Self {
        if let Some(label) = &label {
            host.show_busy_indicator(label);
        }
        Self { host, label }
    }
}

impl Drop for BusyIndicator<'_> {
    fn drop(&mut self) {
        if let Some(label) = &self.label {
            self.host.hide_busy_indicator(label);
        }
    }
}

/// Sends requests through a [`Transport`]
pub struct HttpFetcher<T> {
    transport: T,
    host: Rc<dyn Host>,
}

impl<T: Transport> HttpFetcher<T> {
    pub fn new(transport: T, host: Rc<dyn Host>) -> Self {
        Self { transport, host }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` and fire exactly one of its callbacks.
    ///
    /// A request without a URL is dropped with a warning: no callback fires
    /// and `None` is returned. Otherwise the response is returned on success
    /// and `None` on failure, after the matching callback ran.
    pub async fn fetch(&self, mut request: FetchRequest) -> Option<FetchResponse> {
        if request.url.is_empty() {
            warn!("fetch called without a URL; request dropped");
            return None;
        }

        let completion = Completion {
            on_load: request.on_load.take(),
            on_error: request.on_error.take(),
        };
        let url = request.url.clone();
        let outcome = self.send(request).await;
        completion.finish(&url, outcome)
    }

    /// [`fetch`](Self::fetch) driven to completion on the current thread
    pub fn fetch_blocking(&self, request: FetchRequest) -> Option<FetchResponse> {
        smol::block_on(self.fetch(request))
    }

    /// Send `request` and return the outcome. Callbacks on the request are ignored.
    pub async fn send(&self, request: FetchRequest) -> Result<FetchResponse, NetError> {
        if request.url.is_empty() {
            return Err(NetError::Configuration("request has no URL".into()));
        }

        let url = request.url.clone();
        info!(method = %request.method, url = %url, "HTTP request");

        let busy = BusyIndicator::show(&*self.host, request.busy_indicator.clone());
        let sent = self.transport.send(request.into_transport()).await;
        drop(busy);

        let response = FetchResponse::new(url, sent?);
        if response.is_ok() {
            Ok(response)
        } else {
            let err = response.failure();
            warn!(url = %response.url, error = %err, "request failed");
            Err(err)
        }
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, NetError> {
        Ok(self.send(FetchRequest::get(url)).await?.text)
    }

    pub async fn fetch_json(&self, url: &str) -> Result<JsonValue, NetError> {
        self.send(FetchRequest::get(url)).await?.json()
    }

    pub async fn fetch_xml(&self, url: &str) -> Result<XmlDocument, NetError> {
        self.send(FetchRequest::get(url)).await?.xml()
    }
}

impl<T> fmt::Debug for HttpFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}
