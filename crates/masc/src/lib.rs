//! Masc
//!
//! Dynamic script and stylesheet loading with deduplication, a fetcher
//! that parses JSON, XML and HTML, and named event listeners.
//!
//! # Example
//! ```rust,ignore
//! use masc::{Config, LoadRequest, Masc};
//!
//! let masc = Masc::headless(Config::default())?;
//! smol::block_on(masc.loader().load_script(LoadRequest::new("js/app.js")))?;
//! ```

mod config;
mod logging;

pub use config::Config;
pub use logging::init_logging;

pub use masc_content::{
    ContentError, HtmlFragment, JsonSyntaxError, JsonValue, XmlDocument, XmlParseError,
    parse_json, parse_xml, serialize_json, serialize_xml, split_html_scripts,
};
pub use masc_events::{EventBus, EventEmitter, GlobalEvents, listener};
pub use masc_net::{
    FetchRequest, FetchResponse, Host, HttpFetcher, HttpTransport, LoadEvent, LoadListRequest,
    LoadRequest, LoadState, NetError, NullHost, ResourceKind, ResourceLoader, Transport,
    UrlResolver, resolve_url,
};

// Re-export sub-crates for advanced usage
pub use masc_content as content;
pub use masc_events as events;
pub use masc_net as net;

use std::rc::Rc;

use tracing::info;

/// Toolkit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Facade construction and setup errors
#[derive(Debug, thiserror::Error)]
pub enum MascError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Net(#[from] NetError),
}

/// One loader bound to one host document
pub struct Masc<T = HttpTransport> {
    config: Config,
    host: Rc<dyn Host>,
    loader: ResourceLoader<T>,
}

impl Masc<HttpTransport> {
    /// Over HTTP, for the given host
    pub fn new(config: Config, host: Rc<dyn Host>) -> Result<Self, MascError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.user_agent)?;
        Ok(Self::assemble(config, transport, host))
    }

    /// Over HTTP, with a [`NullHost`] at `config.document_url`
    pub fn headless(config: Config) -> Result<Self, MascError> {
        let host = Rc::new(NullHost::new(config.document_url.clone()));
        Self::new(config, host)
    }
}

impl<T: Transport> Masc<T> {
    /// Over a caller-supplied transport
    pub fn with_transport(config: Config, transport: T, host: Rc<dyn Host>) -> Result<Self, MascError> {
        config.validate()?;
        Ok(Self::assemble(config, transport, host))
    }

    fn assemble(config: Config, transport: T, host: Rc<dyn Host>) -> Self {
        info!(
            version = VERSION,
            document_url = %config.document_url,
            coordinate_loads = config.coordinate_loads,
            "masc initialized"
        );
        let loader = ResourceLoader::new(transport, Rc::clone(&host), config.loader_config());
        Self {
            config,
            host,
            loader,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn loader(&self) -> &ResourceLoader<T> {
        &self.loader
    }

    pub fn fetcher(&self) -> &HttpFetcher<T> {
        self.loader.fetcher()
    }

    /// Resolver bound to the host's current document
    pub fn resolver(&self) -> UrlResolver {
        UrlResolver::new(self.host.current_document_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_headless_rejects_bad_document_url() {
        let config = Config {
            document_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(Masc::headless(config), Err(MascError::Config(_))));
    }

    #[test]
    fn test_resolver_follows_host() {
        let config = Config {
            document_url: "https://site.test/docs/index.html".into(),
            ..Default::default()
        };
        let masc = Masc::headless(config).unwrap();
        assert_eq!(
            masc.resolver().resolve("../img/a.png", None),
            "https://site.test/img/a.png"
        );
    }
}
