//! Masc Networking
//!
//! URL resolution, HTTP fetching, and script/stylesheet loading with
//! deduplication of in-flight requests.
//!
//! Everything here is single-threaded: futures are `!Send` and are meant to
//! be driven by `smol::block_on` or a `smol::LocalExecutor`.

pub mod fetch;
pub mod host;
pub mod loader;
pub mod tracker;
pub mod transport;
pub mod url;

pub use crate::url::{UrlResolver, is_local_file, resolve_url};
pub use fetch::{FetchRequest, FetchResponse, HttpFetcher};
pub use host::{Host, NullHost};
pub use loader::{
    LoadEvent, LoadListRequest, LoadRequest, LoadState, LoaderConfig, LoaderConfigBuilder,
    LoaderStats, ResourceKind, ResourceLoader,
};
pub use tracker::{Callbacks, LoadOutcome, LoadTicket, LoadTracker, Reservation, Waiter};
pub use transport::{
    Credentials, HttpTransport, Method, Transport, TransportRequest, TransportResponse,
};

use masc_content::{ContentError, JsonSyntaxError, XmlParseError};

/// Network and loading error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetError {
    /// Non-success status, or a failure below HTTP (`code` 0)
    #[error("transport error {code}: {description}")]
    Transport { code: u16, description: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Content(#[from] ContentError),

    /// The host failed to evaluate a fetched script
    #[error("script error in {url}: {message}")]
    Script { url: String, message: String },
}

impl NetError {
    pub fn transport(code: u16, description: impl Into<String>) -> Self {
        Self::Transport {
            code,
            description: description.into(),
        }
    }

    /// HTTP status for transport errors, 0 otherwise
    pub fn code(&self) -> u16 {
        match self {
            Self::Transport { code, .. } => *code,
            _ => 0,
        }
    }
}

impl From<JsonSyntaxError> for NetError {
    fn from(err: JsonSyntaxError) -> Self {
        Self::Content(err.into())
    }
}

impl From<XmlParseError> for NetError {
    fn from(err: XmlParseError) -> Self {
        Self::Content(err.into())
    }
}
